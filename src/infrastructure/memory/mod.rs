//! In-Memory Implementations - 内存实现

mod preview_cache;

pub use preview_cache::InMemoryPreviewCache;
