/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 各层前向/反向数值正确性测试（直接调用层契约）
 */

use crate::nn::graph::GraphError;
use crate::nn::layers::{
    Conv2d, MaxPool2d, ReLU, Resize, Sigmoid, SpatialPrior, SquaredErrorLoss, Tanh, TraitLayer,
    Upscale,
};
use crate::tensor::{CombinedTensor, Tensor};
use approx::assert_abs_diff_eq;

fn combined(data: &[f32], shape: [usize; 4]) -> CombinedTensor {
    let mut t = CombinedTensor::new(shape);
    t.data = Tensor::new(data, shape);
    t
}

/// 单输入层的通用演练：连接、前向、（输出梯度全1的）反向
fn run_layer<L: TraitLayer>(
    layer: &mut L,
    input: &CombinedTensor,
) -> Result<(Vec<CombinedTensor>, Tensor), GraphError> {
    let mut outputs = layer.create_outputs(&[input])?;
    layer.connect(&[input], &outputs)?;
    layer.feed_forward(&[input], &mut outputs)?;
    outputs[0].delta.fill(1.0);
    let mut grads = layer.back_propagate(&[input], &outputs)?;
    let grad = grads
        .remove(0)
        .ok_or_else(|| GraphError::ComputationError("期望产出输入梯度".to_string()))?;
    Ok((outputs, grad))
}

// ==================== 逐元素激活 ====================

#[test]
fn test_sigmoid_forward_backward() -> Result<(), GraphError> {
    let input = combined(&[0.0, 1.0, -1.0], [1, 1, 1, 3]);
    let (outputs, grad) = run_layer(&mut Sigmoid::new(), &input)?;

    let y = outputs[0].data.as_slice();
    assert_abs_diff_eq!(y[0], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(y[1], 0.731_058_6, epsilon = 1e-6);
    assert_abs_diff_eq!(y[2], 0.268_941_42, epsilon = 1e-6);

    // d(sigm)/dx = y * (1 - y)
    for (g, &yv) in grad.as_slice().iter().zip(y) {
        assert_abs_diff_eq!(*g, yv * (1.0 - yv), epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn test_relu_forward_backward() -> Result<(), GraphError> {
    let input = combined(&[-1.0, 0.0, 2.0], [1, 1, 1, 3]);
    let (outputs, grad) = run_layer(&mut ReLU::new(), &input)?;

    assert_eq!(outputs[0].data.as_slice(), &[0.0, 0.0, 2.0]);
    // 梯度只在严格正的输入处透传
    assert_eq!(grad.as_slice(), &[0.0, 0.0, 1.0]);
    Ok(())
}

#[test]
fn test_tanh_forward_backward() -> Result<(), GraphError> {
    let input = combined(&[0.0, 0.5, -0.5], [1, 1, 1, 3]);
    let (outputs, grad) = run_layer(&mut Tanh::new(), &input)?;

    let y = outputs[0].data.as_slice();
    assert_abs_diff_eq!(y[0], 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(y[1], 0.462_117_16, epsilon = 1e-6);
    assert_abs_diff_eq!(y[2], -0.462_117_16, epsilon = 1e-6);

    // d(tanh)/dx = 1 - y^2
    for (g, &yv) in grad.as_slice().iter().zip(y) {
        assert_abs_diff_eq!(*g, 1.0 - yv * yv, epsilon = 1e-6);
    }
    Ok(())
}

// ==================== 卷积 ====================

/// 权重显式设定后，valid卷积的前向与反向必须逐元素精确
#[test]
fn test_conv_forward_backward_with_fixed_weights() -> Result<(), GraphError> {
    #[rustfmt::skip]
    let input = combined(&[
        1.0, 2.0, 3.0,
        4.0, 5.0, 6.0,
        7.0, 8.0, 9.0,
    ], [1, 1, 3, 3]);

    let mut layer = Conv2d::new(2, 2, 1, 0, 0.0);
    let mut outputs = layer.create_outputs(&[&input])?;
    layer.connect(&[&input], &outputs)?;
    // 覆盖随机初始化，便于逐元素核对
    layer.parameters_mut()[0].data = Tensor::new(&[1.0, 0.0, 0.0, 2.0], [1, 1, 2, 2]);
    layer.parameters_mut()[1].data.as_slice_mut()[0] = 0.5;

    layer.feed_forward(&[&input], &mut outputs)?;
    assert_eq!(outputs[0].shape(), [1, 1, 2, 2]);
    // out = in[oh][ow] + 2*in[oh+1][ow+1] + 0.5
    assert_eq!(outputs[0].data.as_slice(), &[11.5, 14.5, 20.5, 23.5]);

    outputs[0].delta.fill(1.0);
    let grads = layer.back_propagate(&[&input], &outputs)?;

    // 权重梯度 = Σ 对应输入窗口；偏置梯度 = Σ 输出梯度
    assert_eq!(layer.parameters()[0].delta.as_slice(), &[12.0, 16.0, 24.0, 28.0]);
    assert_abs_diff_eq!(layer.parameters()[1].delta.as_slice()[0], 4.0);

    #[rustfmt::skip]
    let expected_grad = [
        1.0, 1.0, 0.0,
        1.0, 3.0, 2.0,
        0.0, 2.0, 2.0,
    ];
    assert_eq!(grads[0].as_ref().unwrap().as_slice(), &expected_grad);
    Ok(())
}

/// 禁用反向传播后不再产出输入梯度，但参数梯度照常覆写
#[test]
fn test_conv_backprop_disabled_still_computes_weight_gradients() -> Result<(), GraphError> {
    let input = combined(&[1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
    let mut layer = Conv2d::new(2, 2, 1, 0, 0.0);
    let mut outputs = layer.create_outputs(&[&input])?;
    layer.connect(&[&input], &outputs)?;
    layer.set_backprop_enabled(false);

    layer.feed_forward(&[&input], &mut outputs)?;
    outputs[0].delta.fill(1.0);
    let grads = layer.back_propagate(&[&input], &outputs)?;

    assert!(grads[0].is_none());
    assert_eq!(layer.parameters()[0].delta.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    Ok(())
}

#[test]
fn test_conv_rejects_kernel_larger_than_input() {
    let input = CombinedTensor::new([1, 1, 2, 2]);
    let layer = Conv2d::new(3, 3, 1, 0, 0.0);
    assert!(matches!(
        layer.create_outputs(&[&input]),
        Err(GraphError::ShapeMismatch { .. })
    ));
}

/// 0尺寸卷积核必须报错而非panic（usize下溢）
#[test]
fn test_conv_rejects_zero_kernel() {
    let input = CombinedTensor::new([1, 1, 4, 4]);
    for (kw, kh) in [(0, 3), (3, 0)] {
        let layer = Conv2d::new(kw, kh, 1, 0, 0.0);
        assert!(matches!(
            layer.create_outputs(&[&input]),
            Err(GraphError::ShapeMismatch { .. })
        ));
    }
}

// ==================== 池化 ====================

#[test]
fn test_max_pool_forward_and_gradient_routing() -> Result<(), GraphError> {
    #[rustfmt::skip]
    let input = combined(&[
        1.0, 2.0, 0.0, 1.0,
        3.0, 4.0, 1.0, 0.0,
        0.0, 1.0, 5.0, 6.0,
        1.0, 0.0, 7.0, 8.0,
    ], [1, 1, 4, 4]);

    let mut layer = MaxPool2d::new(2, 2);
    let mut outputs = layer.create_outputs(&[&input])?;
    layer.connect(&[&input], &outputs)?;
    layer.feed_forward(&[&input], &mut outputs)?;
    assert_eq!(outputs[0].data.as_slice(), &[4.0, 1.0, 1.0, 8.0]);

    // 每个输出位置给不同的梯度，验证只路由到最大值位置
    outputs[0].delta = Tensor::new(&[10.0, 20.0, 30.0, 40.0], [1, 1, 2, 2]);
    let grads = layer.back_propagate(&[&input], &outputs)?;
    let grad = grads[0].as_ref().unwrap();

    #[rustfmt::skip]
    let expected = [
        0.0,  0.0, 0.0, 20.0,
        0.0, 10.0, 0.0,  0.0,
        0.0, 30.0, 0.0,  0.0,
        0.0,  0.0, 0.0, 40.0,
    ];
    assert_eq!(grad.as_slice(), &expected);
    Ok(())
}

#[test]
fn test_max_pool_rejects_indivisible_input() {
    let input = CombinedTensor::new([1, 1, 5, 5]);
    let layer = MaxPool2d::new(2, 2);
    assert!(matches!(
        layer.create_outputs(&[&input]),
        Err(GraphError::ShapeMismatch { .. })
    ));
}

/// 0尺寸池化窗口必须报错而非panic（除零）
#[test]
fn test_max_pool_rejects_zero_kernel() {
    let input = CombinedTensor::new([1, 1, 4, 4]);
    for (kw, kh) in [(0, 2), (2, 0)] {
        let layer = MaxPool2d::new(kw, kh);
        assert!(matches!(
            layer.create_outputs(&[&input]),
            Err(GraphError::ShapeMismatch { .. })
        ));
    }
}

// ==================== 结构层 ====================

#[test]
fn test_resize_pads_centered_and_crops_gradient() -> Result<(), GraphError> {
    let input = combined(&[1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
    let mut layer = Resize::new(2, 2);
    let mut outputs = layer.create_outputs(&[&input])?;
    layer.connect(&[&input], &outputs)?;
    layer.feed_forward(&[&input], &mut outputs)?;

    assert_eq!(outputs[0].shape(), [1, 1, 4, 4]);
    #[rustfmt::skip]
    let expected = [
        0.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 2.0, 0.0,
        0.0, 3.0, 4.0, 0.0,
        0.0, 0.0, 0.0, 0.0,
    ];
    assert_eq!(outputs[0].data.as_slice(), &expected);

    // 反向只取中心裁剪
    let delta: Vec<f32> = (0..16).map(|i| i as f32).collect();
    outputs[0].delta = Tensor::new(&delta, [1, 1, 4, 4]);
    let grads = layer.back_propagate(&[&input], &outputs)?;
    assert_eq!(grads[0].as_ref().unwrap().as_slice(), &[5.0, 6.0, 9.0, 10.0]);
    Ok(())
}

#[test]
fn test_upscale_nearest_neighbor_and_gradient_sum() -> Result<(), GraphError> {
    let input = combined(&[1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
    let (outputs, grad) = run_layer(&mut Upscale::new(2, 2), &input)?;

    #[rustfmt::skip]
    let expected = [
        1.0, 1.0, 2.0, 2.0,
        1.0, 1.0, 2.0, 2.0,
        3.0, 3.0, 4.0, 4.0,
        3.0, 3.0, 4.0, 4.0,
    ];
    assert_eq!(outputs[0].data.as_slice(), &expected);

    // 每个输入元素收集2x2块内的4份梯度
    assert_eq!(grad.as_slice(), &[4.0, 4.0, 4.0, 4.0]);
    Ok(())
}

#[test]
fn test_spatial_prior_appends_coordinate_maps() -> Result<(), GraphError> {
    let input = combined(&[7.0; 9], [1, 1, 3, 3]);
    let mut layer = SpatialPrior::new();
    let mut outputs = layer.create_outputs(&[&input])?;
    layer.connect(&[&input], &outputs)?;
    layer.feed_forward(&[&input], &mut outputs)?;

    assert_eq!(outputs[0].shape(), [1, 3, 3, 3]);
    let out = &outputs[0].data;
    for ih in 0..3 {
        for iw in 0..3 {
            assert_abs_diff_eq!(out[[0, 0, ih, iw]], 7.0);
            // x坐标图沿宽度归一化到[0,1]，y坐标图沿高度
            assert_abs_diff_eq!(out[[0, 1, ih, iw]], iw as f32 / 2.0);
            assert_abs_diff_eq!(out[[0, 2, ih, iw]], ih as f32 / 2.0);
        }
    }

    // 坐标图为常量，梯度只透传原有通道
    outputs[0].delta.fill(3.0);
    let grads = layer.back_propagate(&[&input], &outputs)?;
    let grad = grads[0].as_ref().unwrap();
    assert_eq!(grad.shape(), [1, 1, 3, 3]);
    assert!(grad.as_slice().iter().all(|&g| g == 3.0));
    Ok(())
}

// ==================== 损失 ====================

#[test]
fn test_weighted_squared_error_loss() -> Result<(), GraphError> {
    let signal = combined(&[2.0, 3.0], [1, 1, 1, 2]);
    let label = combined(&[1.0, 1.0], [1, 1, 1, 2]);
    let weight = combined(&[1.0, 0.5], [1, 1, 1, 2]);

    let mut layer = SquaredErrorLoss::new();
    let inputs = [&signal, &label, &weight];
    let mut outputs = layer.create_outputs(&inputs)?;
    layer.connect(&inputs, &outputs)?;
    layer.feed_forward(&inputs, &mut outputs)?;

    // loss = 0.5 * (1*(2-1)^2 + 0.5*(3-1)^2) = 1.5
    assert_eq!(outputs[0].shape(), [1, 1, 1, 1]);
    assert_abs_diff_eq!(outputs[0].data.as_slice()[0], 1.5, epsilon = 1e-6);

    // d(loss)/ds = w*(s-l)；标签与权重不产生梯度
    let grads = layer.back_propagate(&inputs, &outputs)?;
    assert_eq!(grads.len(), 3);
    assert_eq!(grads[0].as_ref().unwrap().as_slice(), &[1.0, 1.0]);
    assert!(grads[1].is_none());
    assert!(grads[2].is_none());
    Ok(())
}

#[test]
fn test_loss_rejects_mismatched_label() {
    let signal = combined(&[0.0; 4], [1, 1, 2, 2]);
    let label = combined(&[0.0; 2], [1, 1, 1, 2]);
    let weight = combined(&[0.0; 4], [1, 1, 2, 2]);
    let mut layer = SquaredErrorLoss::new();
    let inputs = [&signal, &label, &weight];
    let outputs = layer.create_outputs(&inputs).unwrap();
    assert!(matches!(
        layer.connect(&inputs, &outputs),
        Err(GraphError::ShapeMismatch { .. })
    ));
}
