//! # Only Conv
//!
//! `only_conv`项目旨在用纯rust实现一个轻便的卷积网络（CNN/FCN）计算图框架：
//! 从紧凑的文本描述（逐行指令）编译出前向/反向传播的有向无环图（DAG），
//! 支持分支/合并拓扑（双栈机制）、感受野预分析、以及可学习的非线性层。
//!
//! 数据集读取、优化器、训练循环等均视为外部协作者，不在本crate范围内。

pub mod nn;
pub mod tensor;
