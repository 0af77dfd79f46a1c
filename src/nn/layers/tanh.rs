use super::{TraitLayer, check_same_shape, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rayon::prelude::*;

/// Tanh 激活层
///
/// forward: tanh(x)
/// backward: d(tanh)/dx = 1 - tanh(x)^2
pub(crate) struct Tanh;

impl Tanh {
    pub(crate) fn new() -> Self {
        Self
    }
}

impl TraitLayer for Tanh {
    fn tag(&self) -> &'static str {
        "tanh"
    }

    fn description(&self) -> String {
        "Tanh Layer".to_string()
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("Tanh", inputs)?;
        Ok(vec![CombinedTensor::new(inputs[0].shape())])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        check_same_shape("Tanh", inputs[0], &outputs[0])
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
            .for_each(|(y, &x)| *y = x.tanh());
        Ok(())
    }

    fn back_propagate(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<Vec<Option<Tensor>>, GraphError> {
        let mut grad = Tensor::zeros(inputs[0].shape());
        let value = outputs[0].data.as_slice();
        let out_delta = outputs[0].delta.as_slice();
        grad.as_slice_mut()
            .par_iter_mut()
            .zip(value.par_iter().zip(out_delta.par_iter()))
            .for_each(|(gx, (&y, &gy))| *gx = gy * (1.0 - y * y));
        Ok(vec![Some(grad)])
    }
}
