//! Knowledge Service Adapters - 知识服务客户端

mod dto;
mod fake_knowledge_client;
mod http_knowledge_client;

pub use fake_knowledge_client::FakeKnowledgeClient;
pub use http_knowledge_client::{HttpKnowledgeClient, HttpKnowledgeClientConfig};
