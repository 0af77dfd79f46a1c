use super::TraitLayer;
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};

/// 数据源节点的层：不做任何计算，只按约定持有外部填充的4个缓冲。
///
/// 缓冲约定（损失挂接步骤依赖该顺序）：
/// - 0 = Data（主信号，`[n, maps, h, w]`）
/// - 1 = Label（标签，`[n, classes, h, w]`）
/// - 2 = Helper（辅助信息，`[n, 2, h, w]`）
/// - 3 = Weight（逐样本权重，`[n, 1, h, w]`）
pub(crate) struct DatasetInput {
    samples: usize,
    maps: usize,
    height: usize,
    width: usize,
    classes: usize,
}

impl DatasetInput {
    pub(crate) fn new(
        samples: usize,
        maps: usize,
        height: usize,
        width: usize,
        classes: usize,
    ) -> Self {
        Self {
            samples,
            maps,
            height,
            width,
            classes,
        }
    }
}

impl TraitLayer for DatasetInput {
    fn tag(&self) -> &'static str {
        "dataset_input"
    }

    fn description(&self) -> String {
        "Dataset Input".to_string()
    }

    fn output_names(&self) -> Vec<String> {
        vec![
            "Data".to_string(),
            "Label".to_string(),
            "Helper".to_string(),
            "Weight".to_string(),
        ]
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        if !inputs.is_empty() {
            return Err(GraphError::InvalidOperation(format!(
                "数据源层不接受输入，实际{}个",
                inputs.len()
            )));
        }
        let (n, h, w) = (self.samples, self.height, self.width);
        Ok(vec![
            CombinedTensor::new([n, self.maps, h, w]),
            CombinedTensor::new([n, self.classes, h, w]),
            CombinedTensor::new([n, 2, h, w]),
            CombinedTensor::new([n, 1, h, w]),
        ])
    }

    fn connect(
        &mut self,
        _inputs: &[&CombinedTensor],
        _outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        Ok(())
    }

    fn feed_forward(
        &mut self,
        _inputs: &[&CombinedTensor],
        _outputs: &mut [CombinedTensor],
    ) -> Result<(), GraphError> {
        // 值由外部执行者通过`set_output_value`填充
        Ok(())
    }

    fn back_propagate(
        &mut self,
        _inputs: &[&CombinedTensor],
        _outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        Ok(Vec::new())
    }
}
