/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 2D 最大池化层（窗口=步长，记录最大值位置用于反向传播）
 */

use super::{TraitLayer, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rayon::prelude::*;

/// 2D 最大池化层。输入的高与宽必须能被池化窗口整除。
pub(crate) struct MaxPool2d {
    kernel_w: usize,
    kernel_h: usize,

    // 缓存（用于反向传播）：每个输出位置对应的最大值在其样本/通道平面内的
    // 展平索引（ih * in_w + iw），形状与输出相同
    max_indices: Option<Tensor>,
}

impl MaxPool2d {
    pub(crate) fn new(kernel_w: usize, kernel_h: usize) -> Self {
        Self {
            kernel_w,
            kernel_h,
            max_indices: None,
        }
    }

    fn output_size(&self, input: &CombinedTensor) -> Result<[usize; 4], GraphError> {
        let [n, maps, in_h, in_w] = input.shape();
        if self.kernel_w == 0
            || self.kernel_h == 0
            || in_w % self.kernel_w != 0
            || in_h % self.kernel_h != 0
        {
            return Err(GraphError::ShapeMismatch {
                expected: vec![self.kernel_h, self.kernel_w],
                got: vec![in_h, in_w],
                message: format!(
                    "MaxPool2d要求池化窗口{}x{}非零且整除输入尺寸{}x{}",
                    self.kernel_w, self.kernel_h, in_w, in_h
                ),
            });
        }
        Ok([n, maps, in_h / self.kernel_h, in_w / self.kernel_w])
    }
}

impl TraitLayer for MaxPool2d {
    fn tag(&self) -> &'static str {
        "max_pool2d"
    }

    fn description(&self) -> String {
        format!("MaxPooling Layer ({}x{})", self.kernel_w, self.kernel_h)
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("MaxPool2d", inputs)?;
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
                message: "MaxPool2d层的输出缓冲形状不满足池化形状规则".to_string(),
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
        let [n, maps, in_h, in_w] = input.shape();
        let [_, _, out_h, out_w] = outputs[0].shape();
        let (k_h, k_w) = (self.kernel_h, self.kernel_w);
        let single_sample_size = maps * out_h * out_w;

        // Rayon 并行处理每个样本
        let batch_results: Vec<(Vec<f32>, Vec<f32>)> = (0..n)
            .into_par_iter()
            .map(|b| {
                let mut sample_output = vec![0.0f32; single_sample_size];
                let mut sample_indices = vec![0.0f32; single_sample_size];
                for c in 0..maps {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let mut max_val = f32::NEG_INFINITY;
                            let mut max_idx: usize = 0;
                            for kh in 0..k_h {
                                for kw in 0..k_w {
                                    let ih = oh * k_h + kh;
                                    let iw = ow * k_w + kw;
                                    let val = input[[b, c, ih, iw]];
                                    if val > max_val {
                                        max_val = val;
                                        max_idx = ih * in_w + iw;
                                    }
                                }
                            }
                            let idx = c * out_h * out_w + oh * out_w + ow;
                            sample_output[idx] = max_val;
                            sample_indices[idx] = max_idx as f32;
                        }
                    }
                }
                (sample_output, sample_indices)
            })
            .collect();

        let mut all_output = Vec::with_capacity(n * single_sample_size);
        let mut all_indices = Vec::with_capacity(n * single_sample_size);
        for (output, indices) in batch_results {
            all_output.extend(output);
            all_indices.extend(indices);
        }

        let output_shape = [n, maps, out_h, out_w];
        outputs[0].data = Tensor::new(&all_output, output_shape);
        self.max_indices = Some(Tensor::new(&all_indices, output_shape));
        Ok(())
    }

    /// `MaxPool` 的梯度非常简单：
    /// - 最大值位置：梯度 = 输出梯度
    /// - 其他位置：梯度 = 0
    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        let max_indices = self
            .max_indices
            .as_ref()
            .ok_or_else(|| GraphError::ComputationError("缺少最大值索引缓存".to_string()))?;

        let [n, maps, in_h, in_w] = inputs[0].shape();
        let [_, _, out_h, out_w] = outputs[0].shape();
        let out_delta = &outputs[0].delta;
        let single_sample_size = maps * in_h * in_w;

        let batch_grads: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|b| {
                let mut sample_grad = vec![0.0f32; single_sample_size];
                for c in 0..maps {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let gy = out_delta[[b, c, oh, ow]];
                            let max_pos = max_indices[[b, c, oh, ow]] as usize;
                            let ih = max_pos / in_w;
                            let iw = max_pos % in_w;
                            sample_grad[c * in_h * in_w + ih * in_w + iw] += gy;
                        }
                    }
                }
                sample_grad
            })
            .collect();

        let all_grad: Vec<f32> = batch_grads.into_iter().flatten().collect();
        Ok(vec![Some(Tensor::new(&all_grad, [n, maps, in_h, in_w]))])
    }
}
