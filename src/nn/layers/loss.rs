/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 加权平方误差损失层（终端节点）
 *
 * 输入约定（损失挂接步骤按此顺序接线）：
 * - inputs[0]: 信号（网络最终输出）
 * - inputs[1]: 标签（数据源缓冲1）
 * - inputs[2]: 逐样本权重（数据源缓冲3，单通道，按空间位置广播到各通道）
 */

use super::TraitLayer;
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};

/// 加权平方误差损失
///
/// forward: loss = 0.5 * Σ w * (s - l)^2
/// backward: d(loss)/ds = w * (s - l)；标签与权重输入不产生梯度
pub(crate) struct SquaredErrorLoss;

impl SquaredErrorLoss {
    pub(crate) fn new() -> Self {
        Self
    }
}

impl TraitLayer for SquaredErrorLoss {
    fn tag(&self) -> &'static str {
        "squared_error_loss"
    }

    fn description(&self) -> String {
        "Loss Layer".to_string()
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        if inputs.len() != 3 {
            return Err(GraphError::InvalidOperation(format!(
                "损失层需要3个输入（信号、标签、权重），实际{}个",
                inputs.len()
            )));
        }
        // 输出是单元素的标量损失
        Ok(vec![CombinedTensor::new([1, 1, 1, 1])])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        _outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        let (signal, label, weight) = (inputs[0], inputs[1], inputs[2]);
        if !signal.same_shape_as(label) {
            return Err(GraphError::ShapeMismatch {
                expected: signal.shape().to_vec(),
                got: label.shape().to_vec(),
                message: "损失层要求标签与信号形状一致".to_string(),
            });
        }
        let [n, _, h, w] = signal.shape();
        if weight.shape() != [n, 1, h, w] {
            return Err(GraphError::ShapeMismatch {
                expected: vec![n, 1, h, w],
                got: weight.shape().to_vec(),
                message: "损失层要求权重为单通道且空间尺寸与信号一致".to_string(),
            });
        }
        Ok(())
    }

    fn feed_forward(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &mut [CombinedTensor],
    ) -> Result<(), GraphError> {
        let (signal, label, weight) = (&inputs[0].data, &inputs[1].data, &inputs[2].data);
        let [n, maps, h, w] = signal.shape();

        let mut loss = 0.0f32;
        for b in 0..n {
            for c in 0..maps {
                for ih in 0..h {
                    for iw in 0..w {
                        let diff = signal[[b, c, ih, iw]] - label[[b, c, ih, iw]];
                        loss += weight[[b, 0, ih, iw]] * diff * diff;
                    }
                }
            }
        }
        outputs[0].data.as_slice_mut()[0] = 0.5 * loss;
        Ok(())
    }

    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        _outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        let (signal, label, weight) = (&inputs[0].data, &inputs[1].data, &inputs[2].data);
        let [n, maps, h, w] = signal.shape();

        let mut grad = Tensor::zeros([n, maps, h, w]);
        for b in 0..n {
            for c in 0..maps {
                for ih in 0..h {
                    for iw in 0..w {
                        grad[[b, c, ih, iw]] = weight[[b, 0, ih, iw]]
                            * (signal[[b, c, ih, iw]] - label[[b, c, ih, iw]]);
                    }
                }
            }
        }
        Ok(vec![Some(grad), None, None])
    }
}
