//! In-Memory Preview Cache Implementation

use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::PreviewCachePort;
use crate::domain::knowledge::{FileId, PreviewEntry, VariantTag};

/// 内存预览缓存
///
/// 按 (文件, 变体) 存取，DashMap 按键串行化读写
pub struct InMemoryPreviewCache {
    entries: DashMap<(FileId, VariantTag), PreviewEntry>,
}

impl InMemoryPreviewCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryPreviewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewCachePort for InMemoryPreviewCache {
    fn get(&self, file_id: &FileId, variant: VariantTag) -> Option<PreviewEntry> {
        self.entries
            .get(&(file_id.clone(), variant))
            .map(|e| e.clone())
    }

    fn put(&self, file_id: &FileId, variant: VariantTag, entry: PreviewEntry) {
        tracing::debug!(
            file_id = %file_id,
            variant = %variant,
            total = entry.total,
            "Preview cached"
        );
        self.entries.insert((file_id.clone(), variant), entry);
    }

    fn clear(&self, file_id: &FileId, variant: VariantTag) {
        if self.entries.remove(&(file_id.clone(), variant)).is_some() {
            tracing::debug!(file_id = %file_id, variant = %variant, "Preview cache cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(total: usize) -> PreviewEntry {
        PreviewEntry {
            chunks: Vec::new(),
            total,
            violation_total: 0,
            fingerprint: "abc".to_string(),
        }
    }

    #[test]
    fn test_put_get_per_variant() {
        let cache = InMemoryPreviewCache::new();
        let f1 = FileId::new("f1");

        cache.put(&f1, VariantTag::Default, entry(10));
        cache.put(&f1, VariantTag::Custom, entry(20));

        assert_eq!(cache.get(&f1, VariantTag::Default).unwrap().total, 10);
        assert_eq!(cache.get(&f1, VariantTag::Custom).unwrap().total, 20);
        assert!(cache.get(&FileId::new("f2"), VariantTag::Default).is_none());
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let cache = InMemoryPreviewCache::new();
        let f1 = FileId::new("f1");

        cache.put(&f1, VariantTag::Custom, entry(5));
        cache.put(&f1, VariantTag::Custom, entry(7));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&f1, VariantTag::Custom).unwrap().total, 7);
    }

    #[test]
    fn test_clear_single_variant() {
        let cache = InMemoryPreviewCache::new();
        let f1 = FileId::new("f1");

        cache.put(&f1, VariantTag::Default, entry(10));
        cache.put(&f1, VariantTag::Custom, entry(20));
        cache.clear(&f1, VariantTag::Custom);

        assert!(cache.get(&f1, VariantTag::Custom).is_none());
        assert!(cache.get(&f1, VariantTag::Default).is_some());
    }
}
