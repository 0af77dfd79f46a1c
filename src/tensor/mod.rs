/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 张量模块：固定4维（[样本, 通道, 高, 宽]）的薄封装
 */

use ndarray::Array4;
use std::ops::{AddAssign, Index, IndexMut};

mod combined;
pub use combined::CombinedTensor;


/// 定义张量的结构体。本crate中所有缓冲区都是固定4维的：
/// `[samples, maps, height, width]`（即Batch-First的`[N, C, H, W]`）。
/// 标量也用`[1, 1, 1, 1]`表示，以保持层接口的一致性。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Array4<f32>,
}

impl Tensor {
    /// 创建一个张量。`data`的长度必须等于`shape`四个元素的乘积，否则panic
    /// （这是调用方的编程错误，而非运行时配置错误）。
    pub fn new(data: &[f32], shape: [usize; 4]) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "张量数据长度{}与形状{:?}不符",
            data.len(),
            shape
        );
        let data = Array4::from_shape_vec(shape, data.to_vec()).unwrap();
        Self { data }
    }

    /// 创建一个全零张量
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self {
            data: Array4::zeros(shape),
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        let (n, c, h, w) = self.data.dim();
        [n, c, h, w]
    }

    /// 样本数（batch维）
    pub fn samples(&self) -> usize {
        self.data.dim().0
    }

    /// 通道数（特征图数）
    pub fn maps(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().2
    }

    pub fn width(&self) -> usize {
        self.data.dim().3
    }

    /// 元素总数
    pub fn elements(&self) -> usize {
        self.data.len()
    }

    pub fn same_shape_as(&self, other: &Self) -> bool {
        self.shape() == other.shape()
    }

    /// 以连续切片访问元素。本crate中的张量都由`Vec`按标准布局构造，
    /// 因此总是连续的。
    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice().unwrap()
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        self.data.as_slice_mut().unwrap()
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }
}

impl Index<[usize; 4]> for Tensor {
    type Output = f32;

    fn index(&self, index: [usize; 4]) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<[usize; 4]> for Tensor {
    fn index_mut(&mut self, index: [usize; 4]) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// 梯度累加用（分支/合并拓扑下，同一输出缓冲可被多个下游消费）
impl AddAssign<&Self> for Tensor {
    fn add_assign(&mut self, rhs: &Self) {
        assert!(
            self.same_shape_as(rhs),
            "形状不一致，无法累加：{:?} 与 {:?}",
            self.shape(),
            rhs.shape()
        );
        self.data += &rhs.data;
    }
}
