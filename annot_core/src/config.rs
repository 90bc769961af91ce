//! `config`：注释配置。
//!
//! - `AnnotatorConfig`：校验过的完整配置（不可变，请求内使用）
//! - `ConfigOverrides`：每个字段都可省略的覆盖项（来自请求参数 JSON 或 TOML 文件）
//!
//! 每次请求：`stored.merge(&overrides)` 得到新的配置，未给出的字段沿用原值。

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::similarity::Measure;

/// 匹配方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingMethod {
    #[default]
    Exact,
    Approximate,
}

impl fmt::Display for MatchingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingMethod::Exact => f.write_str("exact"),
            MatchingMethod::Approximate => f.write_str("approximate"),
        }
    }
}

impl FromStr for MatchingMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchingMethod::Exact),
            "approximate" => Ok(MatchingMethod::Approximate),
            _ => Err(ConfigError::UnknownMatchingMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatorConfig {
    /// 最小窗口（token 数）
    pub min_tokens: usize,
    /// 最大窗口（token 数）
    pub max_tokens: usize,
    pub matching_method: MatchingMethod,
    /// 近似模式的最低相似度，(0, 1]
    pub threshold: f64,
    /// 每个 span 最多保留几个；0 表示不限
    pub top_n: usize,
    /// 查询源 A 使用的度量
    pub measure: Measure,
    /// 不同候选串数量上限；0 表示不限
    pub max_candidates: usize,
    /// 单次请求的时间预算（毫秒）；0 表示不限
    pub time_budget_ms: u64,
    /// 查询失败后的额外重试次数
    pub lookup_retries: usize,
    /// 查询缓存容量；只在构建引擎时生效
    pub cache_capacity: usize,
    /// 输出附带 label 与 score
    pub verbose: bool,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            min_tokens: 1,
            max_tokens: 6,
            matching_method: MatchingMethod::Exact,
            threshold: 0.85,
            top_n: 0,
            measure: Measure::Cosine,
            max_candidates: 10_000,
            time_budget_ms: 0,
            lookup_retries: 1,
            cache_capacity: 1024,
            verbose: false,
        }
    }
}

impl AnnotatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_tokens < 1 || self.min_tokens > self.max_tokens {
            return Err(ConfigError::InvalidTokenRange {
                min: self.min_tokens,
                max: self.max_tokens,
            });
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity);
        }
        Ok(())
    }

    /// 合并覆盖项并校验，返回新的配置；`self` 不变。
    pub fn merge(&self, overrides: &ConfigOverrides) -> Result<AnnotatorConfig, ConfigError> {
        let mut c = self.clone();
        if let Some(v) = overrides.min_tokens {
            c.min_tokens = v;
        }
        if let Some(v) = overrides.max_tokens {
            c.max_tokens = v;
        }
        if let Some(v) = &overrides.matching_method {
            c.matching_method = v.parse()?;
        }
        if let Some(v) = overrides.threshold {
            c.threshold = v;
        }
        if let Some(v) = overrides.top_n {
            c.top_n = v;
        }
        if let Some(v) = &overrides.measure {
            c.measure = v.parse()?;
        }
        if let Some(v) = overrides.max_candidates {
            c.max_candidates = v;
        }
        if let Some(v) = overrides.time_budget_ms {
            c.time_budget_ms = v;
        }
        if let Some(v) = overrides.lookup_retries {
            c.lookup_retries = v;
        }
        if let Some(v) = overrides.cache_capacity {
            c.cache_capacity = v;
        }
        if let Some(v) = overrides.verbose {
            c.verbose = v;
        }
        c.validate()?;
        Ok(c)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        (self.time_budget_ms > 0).then(|| Duration::from_millis(self.time_budget_ms))
    }
}

/// 覆盖项：全部可选。度量与匹配方式以字符串给出，合并时解析，非法值直接报错。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub min_tokens: Option<usize>,
    pub max_tokens: Option<usize>,
    pub matching_method: Option<String>,
    pub threshold: Option<f64>,
    pub top_n: Option<usize>,
    pub measure: Option<String>,
    pub max_candidates: Option<usize>,
    pub time_budget_ms: Option<u64>,
    pub lookup_retries: Option<usize>,
    pub cache_capacity: Option<usize>,
    pub verbose: Option<bool>,
}

impl ConfigOverrides {
    pub fn approximate(threshold: f64) -> Self {
        Self {
            matching_method: Some("approximate".to_string()),
            threshold: Some(threshold),
            ..Self::default()
        }
    }

    /// 把 `other` 中给出的字段叠加到 `self` 上（`other` 优先）。
    pub fn layer(mut self, other: &ConfigOverrides) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            min_tokens,
            max_tokens,
            matching_method,
            threshold,
            top_n,
            measure,
            max_candidates,
            time_budget_ms,
            lookup_retries,
            cache_capacity,
            verbose
        );
        self
    }
}
