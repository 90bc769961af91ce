//! `expander`：查询扩展。把候选串映射为词典中的命中串。
//!
//! - 精确模式：每个候选映射到它自己，相似度 1.0
//! - 近似模式：查询源 A（调用方选度量）直接采纳；查询源 B（固定打分）先放宽阈值取回，
//!   去掉 A 已有的串，再用 jaccard 统一重打分，严格大于阈值才采纳

use std::collections::BTreeSet;
use std::time::Instant;

use crate::cache::LookupCache;
use crate::dictionary::LookupSource;
use crate::error::LookupError;
use crate::model::{CandidateMap, DictionaryEntry, ExpandedQuery, SourceUnavailable};
use crate::similarity::{Measure, NgramSimilarity};

/// 查询源 B 的放宽幅度。
const RELAX_DELTA: f64 = 0.3;

/// 放宽后的阈值：`t > 0.3` 时为 `t - 0.3`，否则保持 `t`。
pub fn relaxed_threshold(t: f64) -> f64 {
    if t > RELAX_DELTA { t - RELAX_DELTA } else { t }
}

/// 查询源位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSlot {
    /// 查询源 A：按调用方度量过滤
    Primary,
    /// 查询源 B：固定打分，需要重打分
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimilarKey {
    slot: SourceSlot,
    query: String,
    measure: Measure,
    threshold_bits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExactKey {
    slot: SourceSlot,
    key: String,
}

/// 两个查询源 + 共享缓存 + 降级策略。
///
/// 重试次数由每次请求的配置给出。查询失败（重试后仍失败）不会中断请求：
/// 记录一条 `SourceUnavailable`，按空结果处理。
pub struct SourceSet<A, B> {
    primary: A,
    secondary: B,
    similar_cache: LookupCache<SimilarKey, BTreeSet<String>>,
    exact_cache: LookupCache<ExactKey, Vec<DictionaryEntry>>,
}

impl<A, B> SourceSet<A, B>
where
    A: LookupSource,
    B: LookupSource,
{
    pub fn new(primary: A, secondary: B, cache_capacity: usize) -> Self {
        Self {
            primary,
            secondary,
            similar_cache: LookupCache::new(cache_capacity),
            exact_cache: LookupCache::new(cache_capacity),
        }
    }

    pub fn primary(&self) -> &A {
        &self.primary
    }

    pub fn similar_cache(&self) -> &LookupCache<SimilarKey, BTreeSet<String>> {
        &self.similar_cache
    }

    fn source_name(&self, slot: SourceSlot) -> &str {
        match slot {
            SourceSlot::Primary => self.primary.name(),
            SourceSlot::Secondary => self.secondary.name(),
        }
    }

    /// 带重试的调用；全部失败时记录并返回 None。
    fn call<T>(
        &self,
        slot: SourceSlot,
        query: &str,
        retries: usize,
        unavailable: &mut Vec<SourceUnavailable>,
        mut f: impl FnMut() -> Result<T, LookupError>,
    ) -> Option<T> {
        let mut last_err = None;
        for attempt in 0..=retries {
            match f() {
                Ok(v) => return Some(v),
                Err(e) => {
                    log::debug!(
                        "查询源 {} 第 {} 次查询 {query:?} 失败：{e}",
                        self.source_name(slot),
                        attempt + 1
                    );
                    last_err = Some(e);
                }
            }
        }
        let reason = last_err.map(|e| e.to_string()).unwrap_or_default();
        log::warn!("查询源 {} 不可用，{query:?} 按空结果处理：{reason}", self.source_name(slot));
        unavailable.push(SourceUnavailable {
            source: self.source_name(slot).to_string(),
            query: query.to_string(),
            reason,
        });
        None
    }

    pub fn similar(
        &self,
        slot: SourceSlot,
        query: &str,
        measure: Measure,
        threshold: f64,
        retries: usize,
        unavailable: &mut Vec<SourceUnavailable>,
    ) -> BTreeSet<String> {
        let key = SimilarKey {
            slot,
            query: query.to_string(),
            measure,
            threshold_bits: threshold.to_bits(),
        };
        if let Some(hit) = self.similar_cache.get(&key) {
            return hit;
        }
        let found = self.call(slot, query, retries, unavailable, || match slot {
            SourceSlot::Primary => self.primary.retrieve_similar(query, measure, threshold),
            SourceSlot::Secondary => self.secondary.retrieve_similar(query, measure, threshold),
        });
        match found {
            Some(set) => {
                self.similar_cache.put(key, set.clone());
                set
            }
            None => BTreeSet::new(),
        }
    }

    fn exact_from(
        &self,
        slot: SourceSlot,
        key: &str,
        retries: usize,
        unavailable: &mut Vec<SourceUnavailable>,
    ) -> Vec<DictionaryEntry> {
        let cache_key = ExactKey {
            slot,
            key: key.to_string(),
        };
        if let Some(hit) = self.exact_cache.get(&cache_key) {
            return hit;
        }
        let found = self.call(slot, key, retries, unavailable, || match slot {
            SourceSlot::Primary => self.primary.retrieve_exact(key),
            SourceSlot::Secondary => self.secondary.retrieve_exact(key),
        });
        match found {
            Some(entries) => {
                self.exact_cache.put(cache_key, entries.clone());
                entries
            }
            None => Vec::new(),
        }
    }

    /// 精确查询：先 A 后 B，按 (identifier, label) 去重。
    pub fn exact(
        &self,
        key: &str,
        retries: usize,
        unavailable: &mut Vec<SourceUnavailable>,
    ) -> Vec<DictionaryEntry> {
        let mut out = self.exact_from(SourceSlot::Primary, key, retries, unavailable);
        for e in self.exact_from(SourceSlot::Secondary, key, retries, unavailable) {
            if !out
                .iter()
                .any(|x| x.identifier == e.identifier && x.label == e.label)
            {
                out.push(e);
            }
        }
        out
    }
}

/// 扩展结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub queries: Vec<ExpandedQuery>,
    /// 时间预算耗尽，部分候选未扩展
    pub truncated: bool,
}

/// 查询扩展器。
#[derive(Debug, Clone)]
pub struct QueryExpander {
    threshold: f64,
    measure: Measure,
    similarity: NgramSimilarity,
    retries: usize,
    deadline: Option<Instant>,
}

impl QueryExpander {
    pub fn new(threshold: f64, measure: Measure) -> Self {
        Self {
            threshold,
            measure,
            similarity: NgramSimilarity::default(),
            retries: 1,
            deadline: None,
        }
    }

    /// 每次查询失败后的额外重试次数。
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// 精确模式：候选即命中串。
    pub fn expand_exact(candidates: &CandidateMap) -> Expansion {
        let queries = candidates
            .iter()
            .flat_map(|(q, offsets)| {
                offsets.iter().map(move |o| ExpandedQuery {
                    requested_query: q.clone(),
                    original_query: q.clone(),
                    offset: *o,
                    similarity: 1.0,
                })
            })
            .collect();
        Expansion {
            queries,
            truncated: false,
        }
    }

    /// 近似模式。
    pub fn expand<A, B>(
        &self,
        candidates: &CandidateMap,
        sources: &SourceSet<A, B>,
        unavailable: &mut Vec<SourceUnavailable>,
    ) -> Expansion
    where
        A: LookupSource,
        B: LookupSource,
    {
        let t = self.threshold;
        let mut out = Expansion::default();

        for (q, offsets) in candidates {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                log::warn!("时间预算耗尽，剩余候选不再扩展");
                out.truncated = true;
                break;
            }

            let ra = sources.similar(
                SourceSlot::Primary,
                q,
                self.measure,
                t,
                self.retries,
                unavailable,
            );
            let rb = sources.similar(
                SourceSlot::Secondary,
                q,
                Measure::Jaccard,
                relaxed_threshold(t),
                self.retries,
                unavailable,
            );

            let mut accepted: Vec<(String, f64)> = ra
                .iter()
                .map(|r| (r.clone(), self.similarity.jaccard(r, q)))
                .collect();
            for r in rb.difference(&ra) {
                let sim = self.similarity.jaccard(q, r);
                if sim > t {
                    accepted.push((r.clone(), sim));
                } else {
                    log::trace!("{q:?} -> {r:?} 重打分 {sim:.3} 未超过阈值 {t}");
                }
            }

            for (r, sim) in &accepted {
                for o in offsets {
                    out.queries.push(ExpandedQuery {
                        requested_query: r.clone(),
                        original_query: q.clone(),
                        offset: *o,
                        similarity: *sim,
                    });
                }
            }
        }

        log::debug!("扩展得到 {} 条查询", out.queries.len());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NormalizationFlags, Offset};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 固定返回一组串，并记录被调用次数。
    struct Fixed {
        name: &'static str,
        hits: Vec<&'static str>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl Fixed {
        fn new(name: &'static str, hits: Vec<&'static str>) -> Self {
            Self {
                name,
                hits,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, Vec::new())
            }
        }
    }

    impl LookupSource for Fixed {
        fn name(&self) -> &str {
            self.name
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError::Unavailable("down".into()));
            }
            Ok(self.hits.iter().map(|s| s.to_string()).collect())
        }

        fn retrieve_exact(&self, key: &str) -> Result<Vec<DictionaryEntry>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError::Timeout);
            }
            Ok(self
                .hits
                .iter()
                .filter(|h| **h == key)
                .map(|h| DictionaryEntry {
                    label: h.to_string(),
                    identifier: format!("{}:{h}", self.name),
                    view_form: h.to_string(),
                })
                .collect())
        }
    }

    fn candidates(q: &str, offsets: &[(usize, usize)]) -> CandidateMap {
        let mut m = BTreeMap::new();
        m.insert(
            q.to_string(),
            offsets.iter().map(|&(b, e)| Offset::new(b, e)).collect(),
        );
        m
    }

    #[test]
    fn relaxation() {
        assert!((relaxed_threshold(0.6) - 0.3).abs() < 1e-9);
        assert_eq!(relaxed_threshold(0.2), 0.2);
        assert_eq!(relaxed_threshold(0.3), 0.3);
        for t in [0.05, 0.3, 0.31, 0.5, 0.9, 1.0] {
            assert!(relaxed_threshold(t) <= t);
        }
    }

    #[test]
    fn exact_mode_is_identity() {
        let c = candidates("brca1", &[(0, 5), (10, 15)]);
        let e = QueryExpander::expand_exact(&c);
        assert_eq!(e.queries.len(), 2);
        assert!(e.queries.iter().all(|q| q.similarity == 1.0 && q.requested_query == "brca1"));
    }

    #[test]
    fn secondary_results_are_rescored() {
        let sim = NgramSimilarity::default();
        let q = "interleukin 2";
        let close = "interleukin-2";
        let far = "interferon";
        assert!(sim.jaccard(q, close) > 0.5);
        assert!(sim.jaccard(q, far) <= 0.5);

        let a = Fixed::new("a", vec![]);
        let b = Fixed::new("b", vec![close, far]);
        let sources = SourceSet::new(&a, &b, 16);
        let mut unavailable = Vec::new();
        let out = QueryExpander::new(0.5, Measure::Cosine).expand(
            &candidates(q, &[(0, 13)]),
            &sources,
            &mut unavailable,
        );
        let got: Vec<&str> = out.queries.iter().map(|q| q.requested_query.as_str()).collect();
        assert_eq!(got, vec![close]);
        assert!(out.queries.iter().all(|q| q.similarity > 0.5));
        assert!(unavailable.is_empty());
    }

    #[test]
    fn primary_results_accepted_and_not_duplicated() {
        let a = Fixed::new("a", vec!["brca1"]);
        let b = Fixed::new("b", vec!["brca1", "brca2"]);
        let sources = SourceSet::new(&a, &b, 16);
        let mut unavailable = Vec::new();
        let out = QueryExpander::new(0.3, Measure::Cosine).expand(
            &candidates("brca1", &[(0, 5), (20, 25)]),
            &sources,
            &mut unavailable,
        );
        let brca1: Vec<_> = out
            .queries
            .iter()
            .filter(|q| q.requested_query == "brca1")
            .collect();
        assert_eq!(brca1.len(), 2);
        assert!(brca1.iter().all(|q| q.similarity == 1.0));
        // brca2 与 brca1 的 jaccard = 4/10 > 0.3
        assert_eq!(
            out.queries.iter().filter(|q| q.requested_query == "brca2").count(),
            2
        );
    }

    #[test]
    fn failing_source_degrades_to_empty() {
        let a = Fixed::new("a", vec!["p53"]);
        let b = Fixed::failing("b");
        let sources = SourceSet::new(&a, &b, 16);
        let mut unavailable = Vec::new();
        let out = QueryExpander::new(0.6, Measure::Cosine).retries(2).expand(
            &candidates("p53", &[(0, 3)]),
            &sources,
            &mut unavailable,
        );
        assert_eq!(out.queries.len(), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 3);
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].source, "b");
    }

    #[test]
    fn lookups_are_cached() {
        let a = Fixed::new("a", vec!["p53"]);
        let b = Fixed::new("b", vec![]);
        let sources = SourceSet::new(&a, &b, 16);
        let mut unavailable = Vec::new();
        let expander = QueryExpander::new(0.6, Measure::Cosine);
        let c = candidates("p53", &[(0, 3)]);
        expander.expand(&c, &sources, &mut unavailable);
        expander.expand(&c, &sources, &mut unavailable);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sources.similar_cache().stats().hits, 2);
    }

    #[test]
    fn exact_merges_both_sources() {
        let a = Fixed::new("a", vec!["p53"]);
        let b = Fixed::new("b", vec!["p53"]);
        let sources = SourceSet::new(&a, &b, 16);
        let mut unavailable = Vec::new();
        let entries = sources.exact("p53", 0, &mut unavailable);
        let ids: Vec<&str> = entries.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a:p53", "b:p53"]);
    }

    #[test]
    fn expired_deadline_truncates() {
        let a = Fixed::new("a", vec!["p53"]);
        let sources = SourceSet::new(&a, crate::dictionary::EmptySource, 16);
        let mut unavailable = Vec::new();
        let out = QueryExpander::new(0.6, Measure::Cosine)
            .deadline(Some(Instant::now()))
            .expand(&candidates("p53", &[(0, 3)]), &sources, &mut unavailable);
        assert!(out.truncated);
        assert!(out.queries.is_empty());
    }
}
