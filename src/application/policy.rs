//! Slice Policy Manager - 切片配置管理
//!
//! 持有自定义策略草稿与服务端下发的规则。两个长度输入框可以独立
//! 编辑，瞬时 min > max 是合法输入；编辑静默一段时间后若仍然倒置
//! 则交换两端（修正而非拒绝）。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{SeparatorOption, SliceRules};
use crate::domain::knowledge::{
    escape_separator, FileSummary, LengthRange, SliceConfig, SliceKind, VariantTag,
    ESCAPED_NEWLINE,
};

/// 切片配置管理器
pub struct SlicePolicyManager {
    inner: Arc<PolicyInner>,
}

struct PolicyInner {
    /// 服务端允许的长度区间
    allowed: LengthRange,
    separators: Vec<SeparatorOption>,
    default_config: SliceConfig,
    settle: Duration,
    draft: Mutex<SliceConfig>,
    settle_token: Mutex<Option<CancellationToken>>,
}

impl SlicePolicyManager {
    pub fn new(rules: SliceRules, settle: Duration) -> Self {
        let draft = SliceConfig::custom(ESCAPED_NEWLINE, rules.length_range);
        Self {
            inner: Arc::new(PolicyInner {
                allowed: rules.length_range,
                separators: rules.separators,
                default_config: rules.default_config,
                settle,
                draft: Mutex::new(draft),
                settle_token: Mutex::new(None),
            }),
        }
    }

    /// 当前自定义草稿
    pub fn draft(&self) -> SliceConfig {
        self.inner.draft.lock().unwrap().clone()
    }

    /// 默认策略配置（服务端规则）
    pub fn default_config(&self) -> SliceConfig {
        self.inner.default_config.clone()
    }

    pub fn allowed_range(&self) -> LengthRange {
        self.inner.allowed
    }

    pub fn separator_options(&self) -> Vec<SeparatorOption> {
        self.inner.separators.clone()
    }

    pub fn set_min(&self, min: u32) {
        self.inner.draft.lock().unwrap().length_range.min = min;
        self.schedule_settle();
    }

    pub fn set_max(&self, max: u32) {
        self.inner.draft.lock().unwrap().length_range.max = max;
        self.schedule_settle();
    }

    pub fn set_separator(&self, separator: &str) {
        self.inner.draft.lock().unwrap().separator = separator.to_string();
    }

    /// 草稿复位为允许区间 + 换行分隔符
    pub fn reset(&self) {
        self.cancel_settle();
        *self.inner.draft.lock().unwrap() =
            SliceConfig::custom(ESCAPED_NEWLINE, self.inner.allowed);
    }

    /// 重新打开文件时用既有切片参数回填草稿，返回应选中的变体
    pub fn seed_from_summary(&self, summary: &FileSummary) -> VariantTag {
        match summary.slice_kind {
            SliceKind::Custom => {
                self.cancel_settle();
                *self.inner.draft.lock().unwrap() = SliceConfig::custom(
                    escape_separator(&summary.separator),
                    summary.length_range,
                );
                VariantTag::Custom
            }
            SliceKind::Automatic => {
                self.reset();
                VariantTag::Default
            }
        }
    }

    /// 编辑静默计时: 每次修改重置，到期后修正倒置的区间
    fn schedule_settle(&self) {
        let token = CancellationToken::new();
        {
            let mut slot = self.inner.settle_token.lock().unwrap();
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(inner.settle) => {
                    let mut draft = inner.draft.lock().unwrap();
                    if !draft.length_range.is_ordered() {
                        let swapped = draft.length_range.normalized();
                        tracing::debug!(
                            min = swapped.min,
                            max = swapped.max,
                            "Length range inverted, swapping bounds"
                        );
                        draft.length_range = swapped;
                    }
                }
            }
        });
    }

    fn cancel_settle(&self) {
        if let Some(token) = self.inner.settle_token.lock().unwrap().take() {
            token.cancel();
        }
    }
}

impl Drop for SlicePolicyManager {
    fn drop(&mut self) {
        self.cancel_settle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::FileId;

    fn rules() -> SliceRules {
        SliceRules {
            default_config: SliceConfig::automatic(),
            length_range: LengthRange::new(1, 256),
            separators: vec![SeparatorOption {
                label: "换行".to_string(),
                value: ESCAPED_NEWLINE.to_string(),
            }],
        }
    }

    fn manager() -> SlicePolicyManager {
        SlicePolicyManager::new(rules(), Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_inverted_range_swapped_after_settle() {
        let policy = manager();
        policy.set_min(300);
        policy.set_max(50);

        // 静默期内保持原样，容忍慢速输入
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(policy.draft().length_range, LengthRange::new(300, 50));

        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert_eq!(policy.draft().length_range, LengthRange::new(50, 300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_edit_restarts_settle_timer() {
        let policy = manager();
        policy.set_min(300);
        tokio::time::advance(Duration::from_millis(800)).await;

        // 第二次编辑重置计时，此刻距首次编辑已超过一个静默期
        policy.set_max(50);
        tokio::time::advance(Duration::from_millis(800)).await;
        tokio::task::yield_now().await;
        assert_eq!(policy.draft().length_range, LengthRange::new(300, 50));

        tokio::time::advance(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;
        assert_eq!(policy.draft().length_range, LengthRange::new(50, 300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordered_range_untouched() {
        let policy = manager();
        policy.set_min(10);
        policy.set_max(100);
        tokio::time::advance(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert_eq!(policy.draft().length_range, LengthRange::new(10, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_from_summary_custom() {
        let policy = manager();
        let summary = FileSummary {
            file_id: FileId::new("f1"),
            slice_kind: SliceKind::Custom,
            length_range: LengthRange::new(20, 180),
            separator: "\n".to_string(),
            char_count: 1000,
            knowledge_count: 12,
            knowledge_avg_length: 80,
            hit_count: 0,
        };
        let variant = policy.seed_from_summary(&summary);
        assert_eq!(variant, VariantTag::Custom);
        let draft = policy.draft();
        assert_eq!(draft.length_range, LengthRange::new(20, 180));
        // 真实换行回填为编辑态转义形式
        assert_eq!(draft.separator, ESCAPED_NEWLINE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_from_summary_automatic_resets() {
        let policy = manager();
        policy.set_min(99);
        let summary = FileSummary {
            file_id: FileId::new("f1"),
            slice_kind: SliceKind::Automatic,
            length_range: LengthRange::new(1, 256),
            separator: ESCAPED_NEWLINE.to_string(),
            char_count: 0,
            knowledge_count: 0,
            knowledge_avg_length: 0,
            hit_count: 0,
        };
        let variant = policy.seed_from_summary(&summary);
        assert_eq!(variant, VariantTag::Default);
        assert_eq!(policy.draft().length_range, LengthRange::new(1, 256));
    }
}
