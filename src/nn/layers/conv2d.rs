/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 2D 卷积层（valid卷积，步长1，带偏置）
 *
 * 设计决策：
 * - Batch-First 格式：输入 [n, maps, H, W]，输出 [n, kernels, H', W']
 * - 权重在`connect`时用本层携带的子种子分配并初始化（编译器从其种子
 *   发生器为每个含参层抽取一个子种子，保证整图可重复）
 * - 使用 Rayon 在样本维度并行加速
 */

use super::{TraitLayer, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rayon::prelude::*;

/// 2D 卷积层
pub(crate) struct Conv2d {
    kernel_w: usize,
    kernel_h: usize,
    kernels: usize,
    /// 权重初始化用的子种子
    seed: u64,
    /// dropout 比例：仅作为元数据携带，掩码由外部训练循环施加
    dropout_fraction: f32,
    llr: f32,
    backprop_enabled: bool,

    in_maps: usize,
    /// 权重 [kernels, in_maps, kernel_h, kernel_w]，`connect`时分配
    weights: Option<CombinedTensor>,
    /// 偏置 [kernels, 1, 1, 1]
    bias: Option<CombinedTensor>,
}

impl Conv2d {
    pub(crate) fn new(
        kernel_w: usize,
        kernel_h: usize,
        kernels: usize,
        seed: u64,
        dropout_fraction: f32,
    ) -> Self {
        Self {
            kernel_w,
            kernel_h,
            kernels,
            seed,
            dropout_fraction,
            llr: 1.0,
            backprop_enabled: true,
            in_maps: 0,
            weights: None,
            bias: None,
        }
    }

    pub(crate) fn dropout_fraction(&self) -> f32 {
        self.dropout_fraction
    }

    fn output_size(&self, input: &CombinedTensor) -> Result<[usize; 4], GraphError> {
        let [n, _maps, in_h, in_w] = input.shape();
        if self.kernel_w == 0
            || self.kernel_h == 0
            || in_w < self.kernel_w
            || in_h < self.kernel_h
        {
            return Err(GraphError::ShapeMismatch {
                expected: vec![self.kernel_h, self.kernel_w],
                got: vec![in_h, in_w],
                message: format!(
                    "卷积核{}x{}须非零且不超出输入尺寸{}x{}",
                    self.kernel_w, self.kernel_h, in_w, in_h
                ),
            });
        }
        Ok([
            n,
            self.kernels,
            in_h - (self.kernel_h - 1),
            in_w - (self.kernel_w - 1),
        ])
    }
}

impl TraitLayer for Conv2d {
    fn tag(&self) -> &'static str {
        "conv2d"
    }

    fn description(&self) -> String {
        format!(
            "Convolutional Layer ({}x{}x{})",
            self.kernel_w, self.kernel_h, self.kernels
        )
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("Conv2d", inputs)?;
        Ok(vec![CombinedTensor::new(self.output_size(inputs[0])?)])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        let expected = self.output_size(inputs[0])?;
        if outputs[0].shape() != expected {
            return Err(GraphError::ShapeMismatch {
                expected: expected.to_vec(),
                got: outputs[0].shape().to_vec(),
                message: "Conv2d层的输出缓冲形状不满足卷积形状规则".to_string(),
            });
        }

        self.in_maps = inputs[0].data.maps();

        // 权重初始化：U[-s, s]，s = 1/sqrt(fan_in)
        let fan_in = self.kernel_w * self.kernel_h * self.in_maps;
        let bound = 1.0 / (fan_in as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let dist = Uniform::from(-bound..=bound);
        let weight_shape = [self.kernels, self.in_maps, self.kernel_h, self.kernel_w];
        let mut weights = CombinedTensor::new(weight_shape);
        for w in weights.data.as_slice_mut() {
            *w = dist.sample(&mut rng);
        }
        self.weights = Some(weights);
        self.bias = Some(CombinedTensor::new([self.kernels, 1, 1, 1]));
        Ok(())
    }

    fn feed_forward(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &mut [CombinedTensor],
    ) -> Result<(), GraphError> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| GraphError::ComputationError("Conv2d层的权重尚未分配".to_string()))?;
        let bias = self
            .bias
            .as_ref()
            .ok_or_else(|| GraphError::ComputationError("Conv2d层的偏置尚未分配".to_string()))?;

        let input = &inputs[0].data;
        let [n, maps, _in_h, _in_w] = input.shape();
        let [_, kernels, out_h, out_w] = outputs[0].shape();
        let (k_h, k_w) = (self.kernel_h, self.kernel_w);
        let single_sample_size = kernels * out_h * out_w;

        // Rayon 并行处理每个样本
        let batch_results: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|b| {
                let mut sample_output = vec![0.0f32; single_sample_size];
                for k in 0..kernels {
                    let b_k = bias.data[[k, 0, 0, 0]];
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let mut acc = b_k;
                            for c in 0..maps {
                                for kh in 0..k_h {
                                    for kw in 0..k_w {
                                        acc += input[[b, c, oh + kh, ow + kw]]
                                            * weights.data[[k, c, kh, kw]];
                                    }
                                }
                            }
                            sample_output[k * out_h * out_w + oh * out_w + ow] = acc;
                        }
                    }
                }
                sample_output
            })
            .collect();

        let all_output: Vec<f32> = batch_results.into_iter().flatten().collect();
        outputs[0].data = Tensor::new(&all_output, [n, kernels, out_h, out_w]);
        Ok(())
    }

    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        let weights = self
            .weights
            .as_mut()
            .ok_or_else(|| GraphError::ComputationError("Conv2d层的权重尚未分配".to_string()))?;
        let bias = self
            .bias
            .as_mut()
            .ok_or_else(|| GraphError::ComputationError("Conv2d层的偏置尚未分配".to_string()))?;

        let input = &inputs[0].data;
        let out_delta = &outputs[0].delta;
        let [n, maps, in_h, in_w] = input.shape();
        let [_, kernels, out_h, out_w] = outputs[0].shape();
        let (k_h, k_w) = (self.kernel_h, self.kernel_w);

        // 权重梯度（按卷积核并行），每轮覆写
        let kernel_grads: Vec<(Vec<f32>, f32)> = (0..kernels)
            .into_par_iter()
            .map(|k| {
                let mut w_grad = vec![0.0f32; maps * k_h * k_w];
                let mut b_grad = 0.0f32;
                for b in 0..n {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let gy = out_delta[[b, k, oh, ow]];
                            b_grad += gy;
                            for c in 0..maps {
                                for kh in 0..k_h {
                                    for kw in 0..k_w {
                                        w_grad[c * k_h * k_w + kh * k_w + kw] +=
                                            gy * input[[b, c, oh + kh, ow + kw]];
                                    }
                                }
                            }
                        }
                    }
                }
                (w_grad, b_grad)
            })
            .collect();

        for (k, (w_grad, b_grad)) in kernel_grads.iter().enumerate() {
            for c in 0..maps {
                for kh in 0..k_h {
                    for kw in 0..k_w {
                        weights.delta[[k, c, kh, kw]] = w_grad[c * k_h * k_w + kh * k_w + kw];
                    }
                }
            }
            bias.delta[[k, 0, 0, 0]] = *b_grad;
        }

        // 首层不需要向数据源回传输入梯度
        if !self.backprop_enabled {
            return Ok(vec![None]);
        }

        // 输入梯度（按样本并行）
        let weights = &*weights;
        let single_sample_size = maps * in_h * in_w;
        let batch_grads: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|b| {
                let mut sample_grad = vec![0.0f32; single_sample_size];
                for k in 0..kernels {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let gy = out_delta[[b, k, oh, ow]];
                            if gy == 0.0 {
                                continue;
                            }
                            for c in 0..maps {
                                for kh in 0..k_h {
                                    for kw in 0..k_w {
                                        let ih = oh + kh;
                                        let iw = ow + kw;
                                        sample_grad[c * in_h * in_w + ih * in_w + iw] +=
                                            gy * weights.data[[k, c, kh, kw]];
                                    }
                                }
                            }
                        }
                    }
                }
                sample_grad
            })
            .collect();

        let all_grad: Vec<f32> = batch_grads.into_iter().flatten().collect();
        Ok(vec![Some(Tensor::new(&all_grad, [n, maps, in_h, in_w]))])
    }

    fn parameters(&self) -> Vec<&CombinedTensor> {
        self.weights.iter().chain(self.bias.iter()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut CombinedTensor> {
        self.weights.iter_mut().chain(self.bias.iter_mut()).collect()
    }

    fn set_backprop_enabled(&mut self, enabled: bool) {
        self.backprop_enabled = enabled;
    }

    fn set_local_learning_rate(&mut self, llr: f32) {
        self.llr = llr;
    }

    fn local_learning_rate(&self) -> f32 {
        self.llr
    }
}
