//! Domain Layer - 领域层
//!
//! 单一限界上下文:
//! - Knowledge Context: 知识库切片与向量化

pub mod knowledge;
