/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 负责卷积网络计算图的构建与执行
 */

pub mod factory;
pub mod graph;
pub mod layers;

pub use factory::{NetFactory, TrainingMethod};
pub use graph::{Connection, Graph, GraphError, NodeId};

#[cfg(test)]
mod tests;
