use super::{TraitLayer, check_same_shape, check_single_input};
use crate::nn::GraphError;
use crate::tensor::{CombinedTensor, Tensor};
use rayon::prelude::*;

/// Sigmoid 激活层
///
/// forward: sigmoid(x) = 1 / (1 + e^(-x))
/// backward: d(sigmoid)/dx = sigmoid(x) * (1 - sigmoid(x))
pub(crate) struct Sigmoid;

impl Sigmoid {
    pub(crate) fn new() -> Self {
        Self
    }
}

impl TraitLayer for Sigmoid {
    fn tag(&self) -> &'static str {
        "sigmoid"
    }

    fn description(&self) -> String {
        "Sigmoid Layer".to_string()
    }

    fn create_outputs(
        &self,
        inputs: &[&CombinedTensor],
    ) -> Result<Vec<CombinedTensor>, GraphError> {
        check_single_input("Sigmoid", inputs)?;
        Ok(vec![CombinedTensor::new(inputs[0].shape())])
    }

    fn connect(
        &mut self,
        inputs: &[&CombinedTensor],
        outputs: &[CombinedTensor],
    ) -> Result<(), GraphError> {
        check_same_shape("Sigmoid", inputs[0], &outputs[0])
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
            .for_each(|(y, &x)| *y = 1.0 / (1.0 + (-x).exp()));
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
            .for_each(|(gx, (&y, &gy))| *gx = gy * y * (1.0 - y));
        Ok(vec![Some(grad)])
    }
}
