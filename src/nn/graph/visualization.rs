/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : Graph 的 Graphviz DOT 可视化（只读投影，不参与执行语义）
 */

use super::Graph;
use crate::nn::layers::TraitLayer;
use std::fmt::Write;

impl Graph {
    /// 生成 Graphviz DOT 格式的图描述字符串。
    ///
    /// 返回的字符串可用于：
    /// - 在线预览：<https://dreampuf.github.io/GraphvizOnline/>
    /// - 嵌入到其他文档或工具中
    ///
    /// 每个节点渲染为 record 形状，输出缓冲以`<oN>`端口标注；
    /// 边从生产者的具体端口指向消费者。
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        dot.push_str("digraph Net {\n");
        dot.push_str("    rankdir=TB;\n");
        dot.push_str("    node [fontname=\"Microsoft YaHei,SimHei,Arial\"];\n");
        dot.push('\n');

        for node in self.iter_nodes() {
            let layer = node.layer();
            let names = layer.output_names();
            let label = if names.len() == 1 {
                format!("{{{} | <o0> {}}}", layer.description(), names[0])
            } else {
                let ports = names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| format!("<o{i}> {n}"))
                    .collect::<Vec<_>>()
                    .join(" | ");
                format!("{{{} | {{{}}}}}", layer.description(), ports)
            };
            let _ = writeln!(
                dot,
                "    node{} [shape=record, label=\"{}\"];",
                node.id().0,
                label
            );
        }
        dot.push('\n');

        for node in self.iter_nodes() {
            for conn in node.inputs() {
                let _ = writeln!(
                    dot,
                    "    node{}:o{} -> node{};",
                    conn.node.0,
                    conn.buffer,
                    node.id().0
                );
            }
        }

        dot.push_str("}\n");
        dot
    }
}
