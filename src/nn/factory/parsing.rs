/*
 * @Author       : 老董
 * @Date         : 2026-08-30
 * @Description  : 指令行解析辅助（key=value 词法，"尽力而为"语义：
 *                 缺失或格式错误的键不报错，调用方保留默认值）
 */

/// 行是否以完整的标识符开头（标识符后须是行尾或空白，
/// 避免"sigm"误匹配"sigmoid2"这类前缀）
pub(crate) fn starts_with_identifier(line: &str, identifier: &str) -> bool {
    match line.strip_prefix(identifier) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

/// 在行内查找`key=value`词并返回value文本
pub(crate) fn parse_string_if_possible(line: &str, key: &str) -> Option<String> {
    for token in line.split_whitespace() {
        if let Some(value) = token.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')) {
            return Some(value.to_string());
        }
    }
    None
}

pub(crate) fn parse_count_if_possible(line: &str, key: &str) -> Option<usize> {
    parse_string_if_possible(line, key)?.parse().ok()
}

pub(crate) fn parse_float_if_possible(line: &str, key: &str) -> Option<f32> {
    parse_string_if_possible(line, key)?.parse().ok()
}

/// 解析`key=AxB`形式的核尺寸（如`size=3x3`）
pub(crate) fn parse_kernel_size_if_possible(line: &str, key: &str) -> Option<(usize, usize)> {
    let value = parse_string_if_possible(line, key)?;
    let (x, y) = value.split_once('x')?;
    Some((x.parse().ok()?, y.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_identifier() {
        assert!(starts_with_identifier("convolutional size=3x3", "convolutional"));
        assert!(starts_with_identifier("sigm", "sigm"));
        assert!(!starts_with_identifier("sigmoid", "sigm"));
        assert!(!starts_with_identifier("maxpooling", "convolutional"));
    }

    #[test]
    fn test_parse_kernel_size() {
        assert_eq!(
            parse_kernel_size_if_possible("convolutional size=3x5 kernels=8", "size"),
            Some((3, 5))
        );
        assert_eq!(parse_kernel_size_if_possible("convolutional", "size"), None);
        assert_eq!(
            parse_kernel_size_if_possible("convolutional size=3", "size"),
            None
        );
    }

    #[test]
    fn test_parse_count_and_float() {
        let line = "convolutional size=1x1 kernels=12 dropout=0.25 llr=0.5";
        assert_eq!(parse_count_if_possible(line, "kernels"), Some(12));
        assert_eq!(parse_float_if_possible(line, "dropout"), Some(0.25));
        assert_eq!(parse_float_if_possible(line, "llr"), Some(0.5));
        assert_eq!(parse_count_if_possible(line, "neurons"), None);
        // 格式错误的值不报错，调用方保留默认
        assert_eq!(parse_count_if_possible("kernels=abc", "kernels"), None);
    }
}
