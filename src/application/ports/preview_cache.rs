//! Preview Cache Port - 预览结果缓存
//!
//! 键为 (文件, 策略变体)，值为最近一次成功切片的首屏结果。
//! 命中缓存时变体切换不触发任何网络调用，也不提交新作业。
//! 无淘汰策略——上限是打开的文件数 × 2 个变体，随编辑会话一起丢弃。

use crate::domain::knowledge::{FileId, PreviewEntry, VariantTag};

/// Preview Cache Port
///
/// 读取绝不触发网络调用；多线程运行时下实现方需按键串行化访问
pub trait PreviewCachePort: Send + Sync {
    fn get(&self, file_id: &FileId, variant: VariantTag) -> Option<PreviewEntry>;

    fn put(&self, file_id: &FileId, variant: VariantTag, entry: PreviewEntry);

    fn clear(&self, file_id: &FileId, variant: VariantTag);
}
