//! Events - 文件视图事件推送

mod publisher;

pub use publisher::{EventPublisher, IngestEvent};
