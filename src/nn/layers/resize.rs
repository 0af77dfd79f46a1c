use super::{TraitLayer, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rayon::prelude::*;

/// 边缘扩充层：按感受野大小在输入四周补零，使FCN模式下的输出
/// 与原始输入分辨率对齐。
///
/// 输出尺寸 = 输入尺寸 + (border_x, border_y)，输入内容居中放置。
pub(crate) struct Resize {
    border_x: usize,
    border_y: usize,
}

impl Resize {
    pub(crate) fn new(border_x: usize, border_y: usize) -> Self {
        Self { border_x, border_y }
    }

    const fn offsets(&self) -> (usize, usize) {
        (self.border_x / 2, self.border_y / 2)
    }
}

impl TraitLayer for Resize {
    fn tag(&self) -> &'static str {
        "resize"
    }

    fn description(&self) -> String {
        format!("Resize Layer ({}x{})", self.border_x, self.border_y)
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("Resize", inputs)?;
        let [n, maps, h, w] = inputs[0].shape();
        Ok(vec![CombinedTensor::new([
            n,
            maps,
            h + self.border_y,
            w + self.border_x,
        ])])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        let [n, maps, h, w] = inputs[0].shape();
        let expected = [n, maps, h + self.border_y, w + self.border_x];
        if outputs[0].shape() != expected {
            return Err(GraphError::ShapeMismatch {
                expected: expected.to_vec(),
                got: outputs[0].shape().to_vec(),
                message: "Resize层的输出缓冲形状不满足扩充规则".to_string(),
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
        let (off_x, off_y) = self.offsets();
        let single_sample_size = maps * out_h * out_w;

        let batch_results: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|b| {
                let mut sample_output = vec![0.0f32; single_sample_size];
                for c in 0..maps {
                    for ih in 0..in_h {
                        for iw in 0..in_w {
                            sample_output
                                [c * out_h * out_w + (ih + off_y) * out_w + (iw + off_x)] =
                                input[[b, c, ih, iw]];
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
        let out_delta = &outputs[0].delta;
        let (off_x, off_y) = self.offsets();

        let mut grad = Tensor::zeros([n, maps, in_h, in_w]);
        for b in 0..n {
            for c in 0..maps {
                for ih in 0..in_h {
                    for iw in 0..in_w {
                        grad[[b, c, ih, iw]] = out_delta[[b, c, ih + off_y, iw + off_x]];
                    }
                }
            }
        }
        Ok(vec![Some(grad)])
    }
}
