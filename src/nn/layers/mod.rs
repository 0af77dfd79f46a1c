/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 层模块：统一的前向/反向层契约与各层实现
 *
 * 每个节点恰好拥有一个层实例。层的能力集合：
 * - 形状推断（`create_outputs`）
 * - 参数所有权（`connect`时分配，`on_layer_connect`时延迟初始化）
 * - 前向变换（`feed_forward`，逐元素处保持无分配）
 * - 反向变换（`back_propagate`，逐输入梯度 + 参数梯度覆写）
 */

mod conv2d;
mod input;
mod loss;
mod max_pool2d;
mod rbf;
mod relu;
mod resize;
mod sigmoid;
mod spatial_prior;
mod tanh;
mod upscale;

pub(crate) use conv2d::Conv2d;
pub(crate) use input::DatasetInput;
pub(crate) use loss::SquaredErrorLoss;
pub(crate) use max_pool2d::MaxPool2d;
pub(crate) use rbf::Rbf;
pub(crate) use relu::ReLU;
pub(crate) use resize::Resize;
pub(crate) use sigmoid::Sigmoid;
pub(crate) use spatial_prior::SpatialPrior;
pub(crate) use tanh::Tanh;
pub(crate) use upscale::Upscale;

use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;

#[enum_dispatch]
pub(crate) enum LayerType {
    DatasetInput(DatasetInput),
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Sigmoid(Sigmoid),
    ReLU(ReLU),
    Tanh(Tanh),
    Rbf(Rbf),
    SpatialPrior(SpatialPrior),
    Resize(Resize),
    Upscale(Upscale),
    SquaredErrorLoss(SquaredErrorLoss),
}

/// 层的多态契约。生命周期（训练迭代级）：
/// `Constructed → Connected（参数已分配，未初始化）→ Initialized（钩子已触发）
/// → {FeedForward ⇄ BackPropagate}*`，随所属图一起销毁。
#[enum_dispatch(LayerType)]
pub(crate) trait TraitLayer {
    /// 节点命名用的短标签
    fn tag(&self) -> &'static str;

    /// 可视化用的可读描述
    fn description(&self) -> String;

    /// 各输出缓冲的端口名（可视化用）
    fn output_names(&self) -> Vec<String> {
        vec!["Output".to_string()]
    }

    /// 校验输入数量与非空性，按本层的形状规则分配输出缓冲
    fn create_outputs(&self, inputs: &[&CombinedTensor])
    -> Result<Vec<CombinedTensor>, GraphError>;

    /// 校验输入/输出形状满足本层不变量；成功时可分配并持有参数
    /// （此时参数值允许未初始化）
    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError>;

    /// 延迟初始化钩子：本层首次获知下游消费者时由图触发，恰好一次。
    /// 需要可重复性的参数初始化（如RBF的标量）在此从网络的种子发生器采样。
    fn on_layer_connect(&mut self, _rng: &mut StdRng) {}

    fn feed_forward(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &mut [CombinedTensor],
    ) -> Result<(), GraphError>;

    /// 返回逐输入的梯度（与输入一一对应；`None`表示该输入不需要梯度，
    /// 例如损失层的标签/权重输入，或被禁用反向传播的首层）。
    /// 本层拥有的参数梯度在此一次性覆写（而非累加）。
    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError>;

    /// 本层拥有的可学习参数（值+梯度对）
    fn parameters(&self) -> Vec<&CombinedTensor> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut CombinedTensor> {
        Vec::new()
    }

    /// 禁用后本层不再向上游产出输入梯度（网络首层不需要输入梯度）
    fn set_backprop_enabled(&mut self, _enabled: bool) {}

    fn set_local_learning_rate(&mut self, _llr: f32) {}

    /// 局部学习率乘数，由外部优化器消费
    fn local_learning_rate(&self) -> f32 {
        1.0
    }
}

/// 大多数层只接受恰好一个输入；统一做数量校验
pub(in crate::nn) fn check_single_input(
    layer_name: &str,
    inputs: &[&CombinedTensor],
) -> Result<(), GraphError> {
    if inputs.len() != 1 {
        return Err(GraphError::InvalidOperation(format!(
            "{}层只需要1个输入，实际{}个",
            layer_name,
            inputs.len()
        )));
    }
    Ok(())
}

/// 逐元素层共用的连接校验：输入与输出的样本数、通道数、高、宽必须完全一致
pub(in crate::nn) fn check_same_shape(
    layer_name: &str,
    input: &CombinedTensor,
    output: &CombinedTensor,
) -> Result<(), GraphError> {
    if !input.same_shape_as(output) {
        return Err(GraphError::ShapeMismatch {
            expected: input.shape().to_vec(),
            got: output.shape().to_vec(),
            message: format!("{layer_name}层要求输入与输出形状一致"),
        });
    }
    Ok(())
}
