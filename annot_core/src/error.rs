//! 错误类型：配置校验错误（构建时拒绝）与查询源错误（请求内降级）。

use thiserror::Error;

/// 配置非法：在构建/合并配置时直接拒绝，不做静默回退。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("窗口范围非法：min_tokens={min}, max_tokens={max}（要求 1 <= min <= max）")]
    InvalidTokenRange { min: usize, max: usize },
    #[error("阈值越界：{0}（要求 0 < threshold <= 1）")]
    InvalidThreshold(f64),
    #[error("未知的相似度度量：{0}")]
    UnknownMeasure(String),
    #[error("未知的匹配方式：{0}")]
    UnknownMatchingMethod(String),
    #[error("缓存容量必须大于 0")]
    InvalidCacheCapacity,
    #[error("{0} 只能在构建引擎时设置，不接受按请求覆盖")]
    BuildTimeOnly(&'static str),
}

/// 查询源（外部协作方）返回的错误；核心不会把它向上抛出。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("查询源不可用：{0}")]
    Unavailable(String),
    #[error("查询超时")]
    Timeout,
    #[error("{0}")]
    Other(String),
}
