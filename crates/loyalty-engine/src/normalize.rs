//! 分类标签归一化
//!
//! 商品分类是自由文本，商户配置与订单行中同一分类可能出现大小写、
//! 首尾空白和变音符号差异（如 "Électronique" 与 "electronique"）。
//! 配置写入与累积查找共用同一个归一化函数，保证双方落在同一键上。

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// 归一化分类标签
///
/// 规则：去除首尾空白 -> 转小写 -> Unicode NFD 分解 -> 去除组合记号。
pub fn normalize_category(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_lowercases() {
        assert_eq!(normalize_category("  Electronics  "), "electronics");
        assert_eq!(normalize_category("FOOD"), "food");
    }

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize_category("Électronique"), "electronique");
        assert_eq!(normalize_category("Café"), "cafe");
        assert_eq!(normalize_category("Bücher"), "bucher");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_category("  Crème Brûlée ");
        let twice = normalize_category(&once);
        assert_eq!(once, "creme brulee");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(normalize_category(""), "");
        assert_eq!(normalize_category("   "), "");
    }

    #[test]
    fn test_config_and_lookup_agree() {
        // 配置键与订单行标签写法不同，但归一化后必须相等
        assert_eq!(
            normalize_category("Électronique"),
            normalize_category(" electronique ")
        );
    }
}
