use super::{TraitLayer, check_same_shape, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rayon::prelude::*;

/// ReLU 激活层
///
/// forward: relu(x) = max(0, x)
/// backward: d(relu)/dx = 1 (x > 0) else 0
pub(crate) struct ReLU;

impl ReLU {
    pub(crate) fn new() -> Self {
        Self
    }
}

impl TraitLayer for ReLU {
    fn tag(&self) -> &'static str {
        "relu"
    }

    fn description(&self) -> String {
        "ReLU Layer".to_string()
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("ReLU", inputs)?;
        Ok(vec![CombinedTensor::new(inputs[0].shape())])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        check_same_shape("ReLU", inputs[0], &outputs[0])
    }

    fn feed_forward(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &mut [CombinedTensor],
    ) -> Result<(), GraphError> {
        let input = inputs[0].data.as_slice();
        outputs[0]
            .data
            .as_slice_mut()
            .par_iter_mut()
            .zip(input.par_iter())
            .for_each(|(y, &x)| *y = x.max(0.0));
        Ok(())
    }

    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        let mut grad = Tensor::zeros(inputs[0].shape());
        let input = inputs[0].data.as_slice();
        let out_delta = outputs[0].delta.as_slice();
        grad.as_slice_mut()
            .par_iter_mut()
            .zip(input.par_iter().zip(out_delta.par_iter()))
            .for_each(|(gx, (&x, &gy))| *gx = if x > 0.0 { gy } else { 0.0 });
        Ok(vec![Some(grad)])
    }
}
