//! Krill - 知识库切片与向量化协调器
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Knowledge Context: 切片配置、知识段落、作业状态码判定
//!
//! 应用层 (application/):
//! - Ports: 端口定义（KnowledgeService, PreviewCache）
//! - Poller: 作业状态轮询原语（固定频率、可取消）
//! - Policy: 切片配置管理（长度区间静默修正）
//! - Coordinators: 切片 / 向量化 / 分页协调器
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: 知识服务 HTTP 客户端与测试用 Fake 客户端
//! - Memory: 预览缓存内存实现
//! - Events: 文件视图事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
