/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : Graph 模块：计算图的核心数据结构与执行
 *
 * 公开 API：
 * - `Graph`: DAG 容器（节点按插入顺序即拓扑顺序）
 * - `Connection`: 寻址某节点的某个输出缓冲
 * - `GraphError`: 错误类型
 */

mod error;
mod visualization;

pub use error::GraphError;

use crate::nn::layers::{DatasetInput, LayerType, TraitLayer};
use crate::tensor::{CombinedTensor, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// 节点ID：即节点在图中的插入序号。
/// 由于任何节点的输入只能引用已存在的节点，插入顺序天然就是拓扑顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// 一条连接：寻址`node`的第`buffer`个命名输出缓冲。
/// 创建后不可变，入栈时按值拷贝。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub node: NodeId,
    pub buffer: usize,
}

impl Connection {
    pub const fn new(node: NodeId, buffer: usize) -> Self {
        Self { node, buffer }
    }
}

/// 计算图节点：恰好拥有一个层实例、一组有序输入连接、以及层产出的输出缓冲
pub struct Node {
    id: NodeId,
    name: String,
    layer: LayerType,
    inputs: Vec<Connection>,
    outputs: Vec<CombinedTensor>,
    /// `on_layer_connect`延迟初始化钩子是否已触发（每节点至多一次）
    hook_fired: bool,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Connection] {
        &self.inputs
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn layer(&self) -> &LayerType {
        &self.layer
    }

    pub(crate) fn layer_mut(&mut self) -> &mut LayerType {
        &mut self.layer
    }
}

/// DAG 容器：全部节点 + 参数注册表 + 网络级随机数发生器。
/// 构建严格单线程、按文档顺序进行；执行时层内逐元素并行（Rayon）。
pub struct Graph {
    nodes: Vec<Node>,
    rng: StdRng,
    /// 可训练参数注册表：(节点, 层内参数序号)，供外部优化器消费
    registered_params: Vec<(NodeId, usize)>,
}

impl Graph {
    /// 创建一个带固定种子的计算图（确保可重复性：
    /// 相同种子 ⇒ 相同拓扑与相同的延迟初始化参数值）
    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            nodes: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            registered_params: Vec::new(),
        }
    }

    // ========== 基础访问器 ==========

    pub fn nodes_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get_node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::NodeNotFound(id))
    }

    pub(in crate::nn) fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// 读取一条连接指向的输出缓冲
    pub fn output(&self, conn: Connection) -> Result<&CombinedTensor, GraphError> {
        let node = self.get_node(conn.node)?;
        node.outputs
            .get(conn.buffer)
            .ok_or(GraphError::DanglingConnection {
                node: conn.node,
                buffer: conn.buffer,
            })
    }

    /// 向某输出缓冲写入值（供外部执行者填充数据源缓冲）
    pub fn set_output_value(&mut self, conn: Connection, value: &Tensor) -> Result<(), GraphError> {
        let buffer = self
            .nodes
            .get_mut(conn.node.0)
            .ok_or(GraphError::NodeNotFound(conn.node))?
            .outputs
            .get_mut(conn.buffer)
            .ok_or(GraphError::DanglingConnection {
                node: conn.node,
                buffer: conn.buffer,
            })?;
        if !buffer.data.same_shape_as(value) {
            return Err(GraphError::ShapeMismatch {
                expected: buffer.data.shape().to_vec(),
                got: value.shape().to_vec(),
                message: "写入的值与缓冲形状不符".to_string(),
            });
        }
        buffer.data = value.clone();
        Ok(())
    }

    // ========== 构建 ==========

    /// 添加数据源节点（缓冲约定：0=Data，1=Label，2=Helper，3=Weight），
    /// 返回指向其主信号缓冲的连接
    pub fn add_dataset_input(
        &mut self,
        samples: usize,
        maps: usize,
        height: usize,
        width: usize,
        classes: usize,
    ) -> Result<Connection, GraphError> {
        let id = self.add_node(
            DatasetInput::new(samples, maps, height, width, classes).into(),
            vec![],
        )?;
        Ok(Connection::new(id, 0))
    }

    /// 向图中追加一个节点。
    /// 无环不变量在此强制成立：所有输入连接必须解析到已存在的节点与缓冲。
    pub(crate) fn add_node(
        &mut self,
        mut layer: LayerType,
        inputs: Vec<Connection>,
    ) -> Result<NodeId, GraphError> {
        // 1. 校验连接均可解析（无环不变量）
        let mut input_refs = Vec::with_capacity(inputs.len());
        for conn in &inputs {
            input_refs.push(self.output(*conn)?);
        }

        // 2. 形状推断 + 参数分配
        let outputs = layer.create_outputs(&input_refs)?;
        layer.connect(&input_refs, &outputs)?;

        // 3. 上游节点首次获知下游消费者时，触发其延迟初始化钩子
        for conn in &inputs {
            let idx = conn.node.0;
            if !self.nodes[idx].hook_fired {
                self.nodes[idx].layer.on_layer_connect(&mut self.rng);
                self.nodes[idx].hook_fired = true;
            }
        }

        // 4. 登记可训练参数
        let id = NodeId(self.nodes.len());
        for param_idx in 0..layer.parameters().len() {
            self.registered_params.push((id, param_idx));
        }

        let name = format!("{}_{}", layer.tag(), id.0);
        self.nodes.push(Node {
            id,
            name,
            layer,
            inputs,
            outputs,
            hook_fired: false,
        });
        Ok(id)
    }

    /// 对尚未获知下游消费者的节点（如末端节点）按插入顺序补触发初始化钩子。
    /// 编译器在全部指令处理完后调用一次；顺序确定，保证可重复性。
    pub fn initialize(&mut self) {
        for node in &mut self.nodes {
            if !node.hook_fired {
                node.layer.on_layer_connect(&mut self.rng);
                node.hook_fired = true;
            }
        }
    }

    // ========== 完整性 ==========

    /// 没有任何下游消费者的节点
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        let mut consumed = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for conn in &node.inputs {
                consumed[conn.node.0] = true;
            }
        }
        consumed
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| if c { None } else { Some(NodeId(i)) })
            .collect()
    }

    /// 图是否完整：所有输入连接均解析到存在的输出缓冲，且恰有一个终端节点
    pub fn is_complete(&self) -> bool {
        for node in &self.nodes {
            for conn in &node.inputs {
                if self.output(*conn).is_err() {
                    return false;
                }
            }
        }
        self.terminal_nodes().len() == 1
    }

    // ========== 参数注册表 ==========

    pub fn registered_parameters(&self) -> &[(NodeId, usize)] {
        &self.registered_params
    }

    pub fn parameter(&self, id: NodeId, param_idx: usize) -> Result<&CombinedTensor, GraphError> {
        let node = self.get_node(id)?;
        node.layer
            .parameters()
            .into_iter()
            .nth(param_idx)
            .ok_or_else(|| {
                GraphError::InvalidOperation(format!("节点{}没有第{}个参数", node.name, param_idx))
            })
    }

    /// 参数的可变访问（供外部优化器按注册表更新权重）
    pub fn parameter_mut(
        &mut self,
        id: NodeId,
        param_idx: usize,
    ) -> Result<&mut CombinedTensor, GraphError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(GraphError::NodeNotFound(id))?;
        let name = node.name.clone();
        node.layer
            .parameters_mut()
            .into_iter()
            .nth(param_idx)
            .ok_or_else(|| {
                GraphError::InvalidOperation(format!("节点{name}没有第{param_idx}个参数"))
            })
    }

    // ========== 执行 ==========

    /// 前向传播：按插入顺序（即拓扑顺序）逐节点计算
    pub fn feed_forward(&mut self) -> Result<(), GraphError> {
        for i in 0..self.nodes.len() {
            let (left, right) = self.nodes.split_at_mut(i);
            let node = &mut right[0];
            let input_refs: Vec<&CombinedTensor> = node
                .inputs
                .iter()
                .map(|c| &left[c.node.0].outputs[c.buffer])
                .collect();
            node.layer.feed_forward(&input_refs, &mut node.outputs)?;
        }
        Ok(())
    }

    /// 反向传播：逆序遍历；各层产出的逐输入梯度累加进上游缓冲的梯度槽。
    /// 每轮先清零全部梯度槽——参数梯度由层在本轮内一次性覆写。
    pub fn back_propagate(&mut self) -> Result<(), GraphError> {
        for node in &mut self.nodes {
            for out in &mut node.outputs {
                out.delta.fill(0.0);
            }
        }

        for i in (0..self.nodes.len()).rev() {
            let (left, right) = self.nodes.split_at_mut(i);
            let node = &mut right[0];
            if node.inputs.is_empty() {
                continue;
            }
            let input_refs: Vec<&CombinedTensor> = node
                .inputs
                .iter()
                .map(|c| &left[c.node.0].outputs[c.buffer])
                .collect();
            let grads = node.layer.back_propagate(&input_refs, &node.outputs)?;
            if grads.len() != node.inputs.len() {
                return Err(GraphError::ComputationError(format!(
                    "{}返回的梯度数量{}与输入数量{}不符",
                    node.name,
                    grads.len(),
                    node.inputs.len()
                )));
            }
            for (conn, grad) in node.inputs.iter().zip(grads) {
                if let Some(g) = grad {
                    left[conn.node.0].outputs[conn.buffer].delta += &g;
                }
            }
        }
        Ok(())
    }
}
