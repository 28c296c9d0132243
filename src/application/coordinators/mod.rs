//! Coordinators - 作业协调器
//!
//! 每个打开的文件视图各持有一组协调器实例，互不共享可变状态

mod embed;
mod pager;
mod slice;

pub use embed::{EmbedState, EmbeddingJobCoordinator};
pub use pager::{ChunkPager, PagerOptions, PagerSnapshot};
pub use slice::{SliceJobCoordinator, SliceState};
