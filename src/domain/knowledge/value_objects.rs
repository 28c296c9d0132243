//! Knowledge Context - Value Objects

use serde::{Deserialize, Serialize};

/// 文件唯一标识（由知识服务分配，对协调层不透明）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 预览缓存的策略变体标签
///
/// 每个文件最多两份预览缓存: 默认策略一份、自定义策略一份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantTag {
    Default,
    Custom,
}

impl VariantTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantTag::Default => "default",
            VariantTag::Custom => "custom",
        }
    }
}

impl std::fmt::Display for VariantTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 切片策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceKind {
    /// 自动切片（服务端默认规则）
    Automatic,
    /// 自定义切片（操作者指定分隔符与长度区间）
    Custom,
}

impl SliceKind {
    /// 提交接口使用的数字编码: 0 = 自动, 1 = 自定义
    pub fn as_code(&self) -> i32 {
        match self {
            SliceKind::Automatic => 0,
            SliceKind::Custom => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SliceKind::Automatic),
            1 => Some(SliceKind::Custom),
            _ => None,
        }
    }
}

/// 切片长度区间（字符数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: u32,
    pub max: u32,
}

impl LengthRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// min > max 时交换两端，其余保持不变
    ///
    /// 编辑器允许两个输入框独立修改，瞬时的 min > max 是合法输入，
    /// 因此这里修正而不是报错
    pub fn normalized(self) -> Self {
        if self.min > self.max {
            Self {
                min: self.max,
                max: self.min,
            }
        } else {
            self
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

impl Default for LengthRange {
    fn default() -> Self {
        Self { min: 1, max: 256 }
    }
}

impl std::fmt::Display for LengthRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// 换行分隔符在编辑态的转义形式
pub const ESCAPED_NEWLINE: &str = "\\n";

/// 切片配置
///
/// `separator` 保存编辑态的转义形式（换行显示为 `\\n`），
/// 只在提交给知识服务的瞬间还原为真实字符
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceConfig {
    pub kind: SliceKind,
    pub separator: String,
    pub length_range: LengthRange,
}

impl SliceConfig {
    /// 服务端默认规则对应的配置
    pub fn automatic() -> Self {
        Self {
            kind: SliceKind::Automatic,
            separator: ESCAPED_NEWLINE.to_string(),
            length_range: LengthRange::default(),
        }
    }

    pub fn custom(separator: impl Into<String>, length_range: LengthRange) -> Self {
        Self {
            kind: SliceKind::Custom,
            separator: separator.into(),
            length_range,
        }
    }

    /// 提交用的分隔符（还原转义）
    pub fn wire_separator(&self) -> String {
        unescape_separator(&self.separator)
    }

    /// 配置指纹，用于日志与缓存条目标记
    pub fn fingerprint(&self) -> String {
        let digest = md5::compute(format!(
            "{}:{}:{}:{}",
            self.kind.as_code(),
            self.separator,
            self.length_range.min,
            self.length_range.max
        ));
        format!("{:x}", digest)
    }
}

/// 还原编辑态分隔符: `\\n` -> `\n`
pub fn unescape_separator(separator: &str) -> String {
    separator.replace(ESCAPED_NEWLINE, "\n")
}

/// 编辑态显示用: `\n` -> `\\n`
pub fn escape_separator(separator: &str) -> String {
    separator.replace('\n', ESCAPED_NEWLINE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_range_normalized_swaps() {
        let range = LengthRange::new(300, 50).normalized();
        assert_eq!(range.min, 50);
        assert_eq!(range.max, 300);
    }

    #[test]
    fn test_length_range_normalized_keeps_ordered() {
        let range = LengthRange::new(1, 256).normalized();
        assert_eq!(range, LengthRange::new(1, 256));
    }

    #[test]
    fn test_separator_unescape() {
        assert_eq!(unescape_separator("\\n"), "\n");
        assert_eq!(unescape_separator("。"), "。");
        assert_eq!(escape_separator("\n"), "\\n");
    }

    #[test]
    fn test_slice_kind_codes() {
        assert_eq!(SliceKind::Automatic.as_code(), 0);
        assert_eq!(SliceKind::Custom.as_code(), 1);
        assert_eq!(SliceKind::from_code(1), Some(SliceKind::Custom));
        assert_eq!(SliceKind::from_code(7), None);
    }

    #[test]
    fn test_fingerprint_varies_with_config() {
        let a = SliceConfig::custom("\\n", LengthRange::new(1, 256));
        let b = SliceConfig::custom("。", LengthRange::new(1, 256));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
