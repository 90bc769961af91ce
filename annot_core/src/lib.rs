//! `annot_core`：基于词典的文本注释，纯逻辑层，不做任何 I/O。
//!
//! 流水线：tokenizer -> candidate（滑动窗口 + 停用词 + 规范化）-> expander（精确/近似查询扩展）
//! -> filter（三个后处理 pass）-> engine 输出 `{begin, end, obj}`。
//!
//! 词典存储与近似检索由外部实现，core 只依赖 `LookupSource`。
pub mod cache;
pub mod candidate;
pub mod config;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod expander;
pub mod filter;
pub mod model;
pub mod similarity;
pub mod tokenizer;

pub use config::{AnnotatorConfig, ConfigOverrides, MatchingMethod};
pub use dictionary::{EmptySource, LookupSource};
pub use engine::Annotator;
pub use error::{ConfigError, LookupError};
pub use model::{AnnotationRecord, AnnotationReport, DictionaryEntry, NormalizationFlags, Offset};
pub use similarity::Measure;
