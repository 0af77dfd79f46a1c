/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : RBF 可学习非线性层
 *
 * 单标量参数 r，延迟初始化：
 * - `connect`时分配（值未初始化）
 * - `on_layer_connect`钩子触发时才从网络的种子发生器采样 U[-1, 1]
 *   （相同种子 ⇒ 相同初始参数值）
 */

use super::{TraitLayer, check_same_shape, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rayon::prelude::*;

/// RBF 非线性层
///
/// forward: rbf(x) = e^(-(r*x)^2)
/// backward（对输入）: d(rbf)/dx = -2 * r^2 * x * rbf(x)
/// backward（对参数）: d(rbf)/dr = -2 * r * x^2 * rbf(x)
pub(crate) struct Rbf {
    /// 标量参数 r（形状[1,1,1,1]），`connect`时分配
    param: Option<CombinedTensor>,
}

impl Rbf {
    pub(crate) fn new() -> Self {
        Self { param: None }
    }

    /// 当前参数值（测试与诊断用）
    pub(crate) fn r(&self) -> Option<f32> {
        self.param.as_ref().map(|p| p.data.as_slice()[0])
    }
}

impl TraitLayer for Rbf {
    fn tag(&self) -> &'static str {
        "rbf"
    }

    fn description(&self) -> String {
        "RBF Layer".to_string()
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("RBF", inputs)?;
        Ok(vec![CombinedTensor::new(inputs[0].shape())])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        check_same_shape("RBF", inputs[0], &outputs[0])?;
        // 此时只分配，不初始化——初始值要等到下游拓扑已知（钩子触发）才采样
        self.param = Some(CombinedTensor::new([1, 1, 1, 1]));
        Ok(())
    }

    fn on_layer_connect(&mut self, rng: &mut StdRng) {
        if let Some(param) = &mut self.param {
            let dist = Uniform::from(-1.0f32..=1.0);
            param.data.as_slice_mut()[0] = dist.sample(rng);
        }
    }

    fn feed_forward(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &mut [CombinedTensor],
    ) -> Result<(), GraphError> {
        let r = self
            .param
            .as_ref()
            .ok_or_else(|| GraphError::ComputationError("RBF层的参数尚未分配".to_string()))?
            .data
            .as_slice()[0];
        let input = inputs[0].data.as_slice();
        outputs[0]
            .data
            .as_slice_mut()
            .par_iter_mut()
            .zip(input.par_iter())
            .for_each(|(y, &x)| {
                let rx = r * x;
                *y = (-(rx * rx)).exp();
            });
        Ok(())
    }

    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        let param = self
            .param
            .as_mut()
            .ok_or_else(|| GraphError::ComputationError("RBF层的参数尚未分配".to_string()))?;
        let r = param.data.as_slice()[0];
        let input = inputs[0].data.as_slice();
        let value = outputs[0].data.as_slice();
        let out_delta = outputs[0].delta.as_slice();

        // 输入梯度：逐元素，复用前向输出避免重算指数
        let mut grad = Tensor::zeros(inputs[0].shape());
        grad.as_slice_mut()
            .par_iter_mut()
            .zip(
                input
                    .par_iter()
                    .zip(value.par_iter().zip(out_delta.par_iter())),
            )
            .for_each(|(gx, (&x, (&y, &gy)))| *gx = gy * (-2.0 * r * r) * x * y);

        // 参数梯度：可交换可结合的归约（允许浮点重排序），
        // 归约完成后一次性覆写梯度槽
        let dr: f32 = input
            .par_iter()
            .zip(value.par_iter().zip(out_delta.par_iter()))
            .map(|(&x, (&y, &gy))| gy * (-2.0 * r) * x * x * y)
            .sum();
        param.delta.as_slice_mut()[0] = dr;

        Ok(vec![Some(grad)])
    }

    fn parameters(&self) -> Vec<&CombinedTensor> {
        self.param.iter().collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut CombinedTensor> {
        self.param.iter_mut().collect()
    }
}
