//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

use crate::application::poller::PollerConfig;

/// 应用主配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// 知识服务配置
    #[serde(default)]
    pub service: ServiceConfig,

    /// 作业状态轮询配置
    #[serde(default)]
    pub poll: PollConfig,

    /// 预览分页配置
    #[serde(default)]
    pub preview: PreviewConfig,

    /// 检索配置
    #[serde(default)]
    pub search: SearchConfig,

    /// 切片策略编辑配置
    #[serde(default)]
    pub policy: PolicyConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            poll: PollConfig::default(),
            preview: PreviewConfig::default(),
            search: SearchConfig::default(),
            policy: PolicyConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// 知识服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// 服务基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 轮询配置
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// 轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    /// 最大 tick 数，超出后作业按超时处理
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_ticks() -> u32 {
    300
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_ticks: default_max_ticks(),
        }
    }
}

impl PollConfig {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.interval_ms),
            max_ticks: self.max_ticks,
        }
    }
}

/// 预览分页配置
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    /// 每页段落数
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    10
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// 检索配置
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// 查询去抖窗口（毫秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// 切片策略编辑配置
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// 长度区间编辑的静默窗口（毫秒），到期后修正倒置区间
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
