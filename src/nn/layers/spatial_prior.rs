use super::{TraitLayer, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};

/// 空间先验层：在输入特征图之后追加两张归一化坐标图（x、y各一张，
/// 取值[0, 1]），让后续层能利用像素的绝对位置信息。
/// 仅在整图（FCN）模式下有意义；patch模式下编译器不会构造本层。
pub(crate) struct SpatialPrior;

impl SpatialPrior {
    pub(crate) fn new() -> Self {
        Self
    }
}

impl TraitLayer for SpatialPrior {
    fn tag(&self) -> &'static str {
        "spatial_prior"
    }

    fn description(&self) -> String {
        "SpatialPrior Layer".to_string()
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("SpatialPrior", inputs)?;
        let [n, maps, h, w] = inputs[0].shape();
        Ok(vec![CombinedTensor::new([n, maps + 2, h, w])])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        let [n, maps, h, w] = inputs[0].shape();
        let expected = [n, maps + 2, h, w];
        if outputs[0].shape() != expected {
            return Err(GraphError::ShapeMismatch {
                expected: expected.to_vec(),
                got: outputs[0].shape().to_vec(),
                message: "SpatialPrior层的输出须比输入多2个通道".to_string(),
            });
        }
        Ok(())
    }

    fn feed_forward(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &mut [CombinedTensor],
    ) -> Result<(), GraphError> {
        let input = &inputs[0].data;
        let [n, maps, h, w] = input.shape();
        let output = &mut outputs[0].data;

        for b in 0..n {
            for c in 0..maps {
                for ih in 0..h {
                    for iw in 0..w {
                        output[[b, c, ih, iw]] = input[[b, c, ih, iw]];
                    }
                }
            }
            // 归一化坐标图：x在通道maps，y在通道maps+1
            for ih in 0..h {
                for iw in 0..w {
                    output[[b, maps, ih, iw]] = if w > 1 {
                        iw as f32 / (w - 1) as f32
                    } else {
                        0.0
                    };
                    output[[b, maps + 1, ih, iw]] = if h > 1 {
                        ih as f32 / (h - 1) as f32
                    } else {
                        0.0
                    };
                }
            }
        }
        Ok(())
    }

    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        // 坐标图是常量，梯度只透传原有通道
        let [n, maps, h, w] = inputs[0].shape();
        let out_delta = &outputs[0].delta;
        let mut grad = Tensor::zeros([n, maps, h, w]);
        for b in 0..n {
            for c in 0..maps {
                for ih in 0..h {
                    for iw in 0..w {
                        grad[[b, c, ih, iw]] = out_delta[[b, c, ih, iw]];
                    }
                }
            }
        }
        Ok(vec![Some(grad)])
    }
}
