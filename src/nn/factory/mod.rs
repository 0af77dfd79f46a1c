/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 图编译器（栈机）：对指令流做第二次扫描，实例化节点、
 *                 接线、维护双分支栈、自动插入结构层（resize/upscale/损失）
 *
 * 指令语言（逐行文本）：
 * - `?`前缀的行产出层节点；参数为行内`key=value`词
 * - `pusha`/`pushb`/`popa`/`popb`操作双分支栈（接受`push-a`等连写法）
 * - `method=patch`选择patch训练模式；`manual ...`覆盖感受野自动计算
 * - 每行首个`(o)`字面量被替换为输出类别数；`fullyconnected`重写为1x1卷积
 * - 无法识别的行静默跳过（注释与空行因此合法）
 */

mod analyzer;
mod parsing;

use analyzer::GeometryAnalysis;
use parsing::{
    parse_count_if_possible, parse_float_if_possible, parse_kernel_size_if_possible,
    starts_with_identifier,
};

use crate::nn::graph::{Connection, Graph, GraphError};
use crate::nn::layers::{
    Conv2d, LayerType, MaxPool2d, Rbf, ReLU, Resize, Sigmoid, SpatialPrior, SquaredErrorLoss,
    Tanh, TraitLayer, Upscale,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 训练模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingMethod {
    /// 整图（全卷积）模式：自动插入resize/upscale对以保持分辨率
    Fcn,
    /// patch模式：按感受野大小的图块训练
    Patch,
}

/// 分支栈容量。参考实现对溢出/下溢未作定义；这里显式地快速失败。
const STACK_CAPACITY: usize = 64;

/// 网络工厂：持有指令流与种子，先做几何预分析，再编译出计算图。
/// 相同的指令流与种子 ⇒ 完全相同的图与初始参数（确定性保证）。
pub struct NetFactory {
    description: String,
    seed: u64,
    geometry: GeometryAnalysis,
}

impl NetFactory {
    pub fn new(description: &str, seed: u64, is_training_factory: bool) -> Self {
        let geometry = analyzer::analyze(description, is_training_factory);
        Self {
            description: description.to_string(),
            seed,
            geometry,
        }
    }

    pub fn method(&self) -> TrainingMethod {
        self.geometry.method
    }

    pub fn receptive_field(&self) -> (usize, usize) {
        (
            self.geometry.receptive_field_x,
            self.geometry.receptive_field_y,
        )
    }

    pub fn patch_field(&self) -> (usize, usize) {
        (self.geometry.patch_field_x, self.geometry.patch_field_y)
    }

    /// 累计降采样因子
    pub fn factor(&self) -> (usize, usize) {
        (self.geometry.factor_x, self.geometry.factor_y)
    }

    /// 编译：按文档顺序把指令流实例化进`graph`。
    ///
    /// - `data_connection`: 外部数据源的主信号连接（其节点的缓冲1/3
    ///   在损失挂接时被用作标签/权重）
    /// - `output_classes`: 输出类别数（替换`(o)`、决定输出激活）
    /// - `add_loss_layer`: 是否追加损失节点；追加后图必须完整
    ///
    /// 返回最后一个常规层的输出连接（损失节点不计入游标）。
    pub fn add_layers(
        &self,
        graph: &mut Graph,
        data_connection: Connection,
        output_classes: usize,
        add_loss_layer: bool,
    ) -> Result<Connection, GraphError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut cursor = data_connection;
        let mut stack_a: Vec<Connection> = Vec::with_capacity(STACK_CAPACITY);
        let mut stack_b: Vec<Connection> = Vec::with_capacity(STACK_CAPACITY);

        // 整图模式：数据源之后立即插入resize节点，按感受野扩充输入
        if self.geometry.method == TrainingMethod::Fcn {
            let id = graph.add_node(
                Resize::new(
                    self.geometry.receptive_field_x,
                    self.geometry.receptive_field_y,
                )
                .into(),
                vec![cursor],
            )?;
            cursor = Connection::new(id, 0);
        }

        let mut first_layer = true;

        for raw_line in self.description.lines() {
            let mut line = raw_line.trim().to_string();

            // ---------- 文本预处理（在结构解释之前，按此顺序） ----------

            // 每行仅替换首个`(o)`为输出类别数
            if line.contains("(o)") {
                line = line.replacen("(o)", &output_classes.to_string(), 1);
            }

            // 全连接层重写为1x1卷积（纯文本规范化，并非独立层种类）
            if line.contains("fullyconnected") {
                line = line.replacen("fullyconnected", "convolutional size=1x1", 1);
                line = line.replacen("neurons=", "kernels=", 1);
            }

            // 整图模式下空间维度保留，flatten无意义，丢弃
            if self.geometry.method == TrainingMethod::Fcn && line.contains("flatten") {
                line.clear();
            }

            // 输出激活：单类→tanh，多类→sigm（沿用参考实现的固定策略）
            if line == "?output" {
                line = if output_classes == 1 {
                    "?tanh".to_string()
                } else {
                    "?sigm".to_string()
                };
            }

            // ---------- 栈操作 ----------

            match line.as_str() {
                "pusha" | "push-a" => {
                    Self::push(&mut stack_a, 'a', cursor)?;
                    continue;
                }
                "pushb" | "push-b" => {
                    Self::push(&mut stack_b, 'b', cursor)?;
                    continue;
                }
                "popa" | "pop-a" => {
                    cursor = Self::pop(&mut stack_a, 'a')?;
                    continue;
                }
                "popb" | "pop-b" => {
                    cursor = Self::pop(&mut stack_b, 'b')?;
                    continue;
                }
                _ => {}
            }

            // ---------- 层指令解析 ----------

            let Some(rest) = line.strip_prefix('?') else {
                // 无法识别的行静默跳过
                continue;
            };

            // 含0分量的核尺寸视同格式错误的键，保留默认值
            let valid_size = |size: &(usize, usize)| size.0 > 0 && size.1 > 0;

            let layer: Option<LayerType> = if starts_with_identifier(rest, "convolutional") {
                let (kx, ky) = parse_kernel_size_if_possible(rest, "size")
                    .filter(valid_size)
                    .unwrap_or((1, 1));
                let kernels = parse_count_if_possible(rest, "kernels").unwrap_or(1);
                let dropout = parse_float_if_possible(rest, "dropout").unwrap_or(0.0);
                let llr = parse_float_if_possible(rest, "llr").unwrap_or(1.0);

                // 每个含参层从编译器的发生器抽取一个子种子
                let mut conv = Conv2d::new(kx, ky, kernels, rng.r#gen::<u64>(), dropout);
                conv.set_local_learning_rate(llr);
                Some(conv.into())
            } else if starts_with_identifier(rest, "maxpooling") {
                let (kx, ky) = parse_kernel_size_if_possible(rest, "size")
                    .filter(valid_size)
                    .unwrap_or((1, 1));
                Some(MaxPool2d::new(kx, ky).into())
            } else if starts_with_identifier(rest, "sigm") {
                Some(Sigmoid::new().into())
            } else if starts_with_identifier(rest, "relu") {
                Some(ReLU::new().into())
            } else if starts_with_identifier(rest, "tanh") {
                Some(Tanh::new().into())
            } else if starts_with_identifier(rest, "rbf") {
                Some(Rbf::new().into())
            } else if starts_with_identifier(rest, "spatialprior") {
                // 空间先验只在整图模式下有意义；patch模式下是no-op
                if self.geometry.method == TrainingMethod::Fcn {
                    Some(SpatialPrior::new().into())
                } else {
                    None
                }
            } else if starts_with_identifier(rest, "resize") {
                let (bx, by) = parse_kernel_size_if_possible(rest, "size").unwrap_or((0, 0));
                Some(Resize::new(bx, by).into())
            } else if starts_with_identifier(rest, "upscale") {
                let (fx, fy) = parse_kernel_size_if_possible(rest, "size")
                    .filter(valid_size)
                    .unwrap_or((1, 1));
                Some(Upscale::new(fx, fy).into())
            } else {
                // 未知层标识符：静默跳过
                None
            };

            if let Some(mut layer) = layer {
                // 首个指令产出的层不需要向数据源回传输入梯度
                if first_layer {
                    layer.set_backprop_enabled(false);
                    first_layer = false;
                }
                let id = graph.add_node(layer, vec![cursor])?;
                cursor = Connection::new(id, 0);
            }
        }

        // 整图模式：若存在净降采样，则追加上采样节点恢复输出分辨率
        if self.geometry.method == TrainingMethod::Fcn
            && (self.geometry.factor_x != 1 || self.geometry.factor_y != 1)
        {
            let id = graph.add_node(
                Upscale::new(self.geometry.factor_x, self.geometry.factor_y).into(),
                vec![cursor],
            )?;
            cursor = Connection::new(id, 0);
        }

        // 损失挂接：三个输入 = {信号, 标签(缓冲1), 权重(缓冲3)}
        if add_loss_layer {
            graph.add_node(
                SquaredErrorLoss::new().into(),
                vec![
                    cursor,
                    Connection::new(data_connection.node, 1),
                    Connection::new(data_connection.node, 3),
                ],
            )?;
        }

        // 对尚未获知下游的节点补触发延迟初始化（顺序确定）
        graph.initialize();

        if add_loss_layer && !graph.is_complete() {
            return Err(GraphError::IncompleteGraph(format!(
                "要求损失层时图必须恰有一个终端节点，实际终端节点：{:?}",
                graph.terminal_nodes()
            )));
        }

        Ok(cursor)
    }

    fn push(
        stack: &mut Vec<Connection>,
        name: char,
        conn: Connection,
    ) -> Result<(), GraphError> {
        if stack.len() >= STACK_CAPACITY {
            return Err(GraphError::StackOverflow(name));
        }
        stack.push(conn);
        Ok(())
    }

    fn pop(stack: &mut Vec<Connection>, name: char) -> Result<Connection, GraphError> {
        stack.pop().ok_or(GraphError::StackUnderflow(name))
    }
}
