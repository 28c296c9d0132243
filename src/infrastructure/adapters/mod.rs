//! Infrastructure Adapters - 外部服务适配器

mod knowledge;

pub use knowledge::{FakeKnowledgeClient, HttpKnowledgeClient, HttpKnowledgeClientConfig};
