/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : DOT 可视化输出测试
 */

use crate::nn::graph::{Connection, Graph, GraphError, NodeId};
use crate::nn::layers::Sigmoid;

#[test]
fn test_to_dot_renders_nodes_ports_and_edges() -> Result<(), GraphError> {
    let mut graph = Graph::new_with_seed(0);
    let data = graph.add_dataset_input(1, 1, 4, 4, 2)?;
    graph.add_node(Sigmoid::new().into(), vec![data])?;

    let dot = graph.to_dot();
    assert!(dot.starts_with("digraph Net {"));
    assert!(dot.ends_with("}\n"));

    // 数据源是多端口record：四个命名输出缓冲
    assert!(dot.contains("shape=record"));
    assert!(dot.contains("<o0> Data"));
    assert!(dot.contains("<o1> Label"));
    assert!(dot.contains("<o2> Helper"));
    assert!(dot.contains("<o3> Weight"));

    // 单输出层只有一个端口
    assert!(dot.contains("{Sigmoid Layer | <o0> Output}"));

    // 边从生产者端口指向消费者
    assert!(dot.contains("node0:o0 -> node1;"));
    Ok(())
}

#[test]
fn test_to_dot_edges_carry_buffer_index() -> Result<(), GraphError> {
    let mut graph = Graph::new_with_seed(0);
    let data = graph.add_dataset_input(1, 1, 4, 4, 1)?;
    // 直接从标签缓冲分支（仅为验证端口标注）
    graph.add_node(
        Sigmoid::new().into(),
        vec![Connection::new(data.node, 1)],
    )?;

    let dot = graph.to_dot();
    assert!(dot.contains("node0:o1 -> node1;"));
    assert_eq!(graph.get_node(NodeId(1))?.inputs()[0].buffer, 1);
    Ok(())
}
