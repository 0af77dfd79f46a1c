use super::NodeId;
use thiserror::Error;

/// Graph 构建与执行的错误类型。
/// 注意：无法识别的指令行不是错误——编译器会静默跳过它们（注释/空行合法）。
#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("形状不匹配：期望{expected:?}，实际{got:?}（{message}）")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },

    #[error("无效操作：{0}")]
    InvalidOperation(String),

    #[error("节点{0:?}不存在")]
    NodeNotFound(NodeId),

    #[error("悬空连接：节点{node:?}的输出缓冲{buffer}不存在")]
    DanglingConnection { node: NodeId, buffer: usize },

    #[error("编译器堆栈{0}溢出（容量64）")]
    StackOverflow(char),

    #[error("编译器堆栈{0}下溢（pop时为空）")]
    StackUnderflow(char),

    #[error("计算图不完整：{0}")]
    IncompleteGraph(String),

    #[error("计算错误：{0}")]
    ComputationError(String),
}
