use std::collections::BTreeSet;

use crate::error::LookupError;
use crate::model::{DictionaryEntry, NormalizationFlags};
use crate::similarity::Measure;

/// 查询源抽象：core 不关心词典来自文件/内存/数据库。
///
/// 约定：
/// - key 均为按 `normalization()` 规范化后的串
/// - `retrieve_similar` 返回无序、去重的命中串；是否真的按 `measure` 过滤由实现决定
///   （有的实现使用自己的固定打分，调用方会用 jaccard 重新打分）
/// - 调用是阻塞的；超时请返回 `LookupError::Timeout`，调用方会降级为空结果
pub trait LookupSource: Send + Sync {
    /// 日志/报告中使用的名字。
    fn name(&self) -> &str;

    /// 词典的规范化元数据。
    fn normalization(&self) -> NormalizationFlags;

    fn retrieve_similar(
        &self,
        query: &str,
        measure: Measure,
        threshold: f64,
    ) -> Result<BTreeSet<String>, LookupError>;

    fn retrieve_exact(&self, key: &str) -> Result<Vec<DictionaryEntry>, LookupError>;
}

/// 空查询源：永远没有结果。只配一个词典时作为第二查询源。
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySource;

impl LookupSource for EmptySource {
    fn name(&self) -> &str {
        "empty"
    }

    fn normalization(&self) -> NormalizationFlags {
        NormalizationFlags::default()
    }

    fn retrieve_similar(
        &self,
        _query: &str,
        _measure: Measure,
        _threshold: f64,
    ) -> Result<BTreeSet<String>, LookupError> {
        Ok(BTreeSet::new())
    }

    fn retrieve_exact(&self, _key: &str) -> Result<Vec<DictionaryEntry>, LookupError> {
        Ok(Vec::new())
    }
}

impl<T> LookupSource for &T
where
    T: LookupSource + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn normalization(&self) -> NormalizationFlags {
        (**self).normalization()
    }

    fn retrieve_similar(
        &self,
        query: &str,
        measure: Measure,
        threshold: f64,
    ) -> Result<BTreeSet<String>, LookupError> {
        (**self).retrieve_similar(query, measure, threshold)
    }

    fn retrieve_exact(&self, key: &str) -> Result<Vec<DictionaryEntry>, LookupError> {
        (**self).retrieve_exact(key)
    }
}
