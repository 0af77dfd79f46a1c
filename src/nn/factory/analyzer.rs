/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 感受野预分析：在构造任何节点之前，对完整指令流做一次
 *                 前向扫描，得出几何常量（感受野、patch尺寸、累计降采样因子）
 */

use super::TrainingMethod;
use super::parsing::{
    parse_count_if_possible, parse_kernel_size_if_possible, parse_string_if_possible,
    starts_with_identifier,
};

/// 预分析产出的几何常量。预扫描完成后只读
/// （唯一的例外是`manual`指令：它直接提供数值并使自动累计整体失效）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GeometryAnalysis {
    pub method: TrainingMethod,
    pub receptive_field_x: usize,
    pub receptive_field_y: usize,
    pub patch_field_x: usize,
    pub patch_field_y: usize,
    pub factor_x: usize,
    pub factor_y: usize,
}

/// 扫描指令流。规则（按文档顺序逐行）：
/// - 卷积指令按当时已累计的因子贡献感受野：`rf += factor * (k - 1)`（每轴）
/// - 池化指令只放大累计因子：`factor *= k`（每轴），自身不贡献感受野
/// - `manual`指令（rfx、rfy均>0时）：采用给定值，其后自动累计全部失效
/// - `method=patch`（仅训练工厂）：选用patch模式，感受野每轴再加一个因子
/// - `patch_field = rf + factor`（每轴），总是最后计算
/// - 无法识别的行没有几何贡献，静默忽略（注释、空行合法）
pub(crate) fn analyze(description: &str, is_training_factory: bool) -> GeometryAnalysis {
    let mut method = TrainingMethod::Fcn;
    let mut rf_x = 0usize;
    let mut rf_y = 0usize;
    let mut factor_x = 1usize;
    let mut factor_y = 1usize;
    let mut ignore_layers = false;

    for raw_line in description.lines() {
        let line = raw_line.trim();

        if let Some(value) = parse_string_if_possible(line, "method") {
            if value.starts_with("patch") && is_training_factory {
                method = TrainingMethod::Patch;
            }
        }

        if starts_with_identifier(line, "manual") {
            let rfx = parse_count_if_possible(line, "rfx").unwrap_or(0);
            let rfy = parse_count_if_possible(line, "rfy").unwrap_or(0);
            if rfx > 0 && rfy > 0 {
                rf_x = rfx;
                rf_y = rfy;
                factor_x = parse_count_if_possible(line, "factorx").unwrap_or(1);
                factor_y = parse_count_if_possible(line, "factory").unwrap_or(1);
                ignore_layers = true;
            }
        }

        if let Some(rest) = line.strip_prefix('?') {
            if ignore_layers {
                continue;
            }
            // 含0分量的核尺寸视同格式错误的键：没有几何贡献
            if starts_with_identifier(rest, "convolutional") {
                if let Some((kx, ky)) = parse_kernel_size_if_possible(rest, "size") {
                    if kx > 0 && ky > 0 {
                        rf_x += factor_x * (kx - 1);
                        rf_y += factor_y * (ky - 1);
                    }
                }
            }
            if starts_with_identifier(rest, "maxpooling") {
                if let Some((kx, ky)) = parse_kernel_size_if_possible(rest, "size") {
                    if kx > 0 && ky > 0 {
                        factor_x *= kx;
                        factor_y *= ky;
                    }
                }
            }
        }
    }

    if method == TrainingMethod::Patch {
        rf_x += factor_x;
        rf_y += factor_y;
    }

    GeometryAnalysis {
        method,
        receptive_field_x: rf_x,
        receptive_field_y: rf_y,
        patch_field_x: rf_x + factor_x,
        patch_field_y: rf_y + factor_y,
        factor_x,
        factor_y,
    }
}
