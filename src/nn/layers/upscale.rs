use super::{TraitLayer, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rayon::prelude::*;

/// 上采样层：最近邻放大，恢复被池化降低的分辨率。
/// FCN模式下编译器在指令流末尾按累计降采样因子自动插入。
pub(crate) struct Upscale {
    factor_x: usize,
    factor_y: usize,
}

impl Upscale {
    pub(crate) fn new(factor_x: usize, factor_y: usize) -> Self {
        Self { factor_x, factor_y }
    }
}

impl TraitLayer for Upscale {
    fn tag(&self) -> &'static str {
        "upscale"
    }

    fn description(&self) -> String {
        format!("Upscale Layer ({}x{})", self.factor_x, self.factor_y)
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("Upscale", inputs)?;
        let [n, maps, h, w] = inputs[0].shape();
        Ok(vec![CombinedTensor::new([
            n,
            maps,
            h * self.factor_y,
            w * self.factor_x,
        ])])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        let [n, maps, h, w] = inputs[0].shape();
        let expected = [n, maps, h * self.factor_y, w * self.factor_x];
        if outputs[0].shape() != expected {
            return Err(GraphError::ShapeMismatch {
                expected: expected.to_vec(),
                got: outputs[0].shape().to_vec(),
                message: "Upscale层的输出缓冲形状不满足放大规则".to_string(),
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
        let [n, maps, _in_h, _in_w] = input.shape();
        let [_, _, out_h, out_w] = outputs[0].shape();
        let (f_x, f_y) = (self.factor_x, self.factor_y);
        let single_sample_size = maps * out_h * out_w;

        let batch_results: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|b| {
                let mut sample_output = vec![0.0f32; single_sample_size];
                for c in 0..maps {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            sample_output[c * out_h * out_w + oh * out_w + ow] =
                                input[[b, c, oh / f_y, ow / f_x]];
                        }
                    }
                }
                sample_output
            })
            .collect();

        let all_output: Vec<f32> = batch_results.into_iter().flatten().collect();
        outputs[0].data = Tensor::new(&all_output, [n, maps, out_h, out_w]);
        Ok(())
    }

    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        let [n, maps, in_h, in_w] = inputs[0].shape();
        let [_, _, out_h, out_w] = outputs[0].shape();
        let out_delta = &outputs[0].delta;
        let (f_x, f_y) = (self.factor_x, self.factor_y);

        // 每个输入元素收集其放大块内全部输出梯度之和
        let mut grad = Tensor::zeros([n, maps, in_h, in_w]);
        for b in 0..n {
            for c in 0..maps {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        grad[[b, c, oh / f_y, ow / f_x]] += out_delta[[b, c, oh, ow]];
                    }
                }
            }
        }
        Ok(vec![Some(grad)])
    }
}
