use super::Tensor;

/// 值缓冲 + 同形状梯度缓冲的组合。
/// 计算图中每个`Connection`寻址的就是一个`CombinedTensor`；
/// 层拥有的可学习参数也用它表示（值 + 梯度槽）。
#[derive(Debug, Clone)]
pub struct CombinedTensor {
    /// 前向传播的值
    pub data: Tensor,
    /// 反向传播的梯度（与`data`同形状）
    pub delta: Tensor,
}

impl CombinedTensor {
    /// 创建一个值与梯度均为全零的组合张量
    pub fn new(shape: [usize; 4]) -> Self {
        Self {
            data: Tensor::zeros(shape),
            delta: Tensor::zeros(shape),
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.data.shape()
    }

    pub fn elements(&self) -> usize {
        self.data.elements()
    }

    pub fn same_shape_as(&self, other: &Self) -> bool {
        self.data.same_shape_as(&other.data)
    }
}
