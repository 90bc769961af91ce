use std::collections::HashSet;
use std::time::Instant;

use crate::candidate::{CandidateGenerator, Normalizer};
use crate::config::{AnnotatorConfig, ConfigOverrides, MatchingMethod};
use crate::dictionary::LookupSource;
use crate::error::ConfigError;
use crate::expander::{Expansion, QueryExpander, SourceSet};
use crate::filter::{BestOverlapByMatch, CrossingBoundary, Filter, TopNPerSpan};
use crate::model::{Annotation, AnnotationRecord, AnnotationReport, ExpandedQuery, SourceUnavailable};
use crate::tokenizer::Tokenizer;

/// 注释引擎：负责按请求配置选择精确/近似流水线，并把各阶段串起来。
///
/// 流水线：
/// - exact：tokenizer -> candidate -> 精确查询 -> TopN(可选) -> 交叉裁决 -> 输出
/// - approximate：tokenizer -> candidate -> 查询扩展 -> 精确查询命中串 -> TopN(可选)
///   -> 同串重叠裁决 -> 交叉裁决 -> 输出
///
/// 引擎本身只读（`&self`），默认配置在构建时校验；每次请求合并出新的配置。
/// 查询缓存随引擎存在，容量取构建时的 `cache_capacity`，请求里再给出会被拒绝。
/// 重试次数与时间预算按请求生效。
pub struct Annotator<A, B> {
    sources: SourceSet<A, B>,
    config: AnnotatorConfig,
    tokenizer: Tokenizer,
}

impl<A, B> Annotator<A, B>
where
    A: LookupSource,
    B: LookupSource,
{
    /// `primary` 为查询源 A（其规范化元数据决定候选如何规范化），`secondary` 为查询源 B。
    pub fn new(primary: A, secondary: B) -> Self {
        let config = AnnotatorConfig::default();
        Self {
            sources: SourceSet::new(primary, secondary, config.cache_capacity),
            config,
            tokenizer: Tokenizer::new(),
        }
    }

    pub fn with_config(primary: A, secondary: B, config: AnnotatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sources: SourceSet::new(primary, secondary, config.cache_capacity),
            config,
            tokenizer: Tokenizer::new(),
        })
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn sources(&self) -> &SourceSet<A, B> {
        &self.sources
    }

    /// 只返回注释记录。
    pub fn annotate(
        &self,
        text: &str,
        overrides: &ConfigOverrides,
    ) -> Result<Vec<AnnotationRecord>, ConfigError> {
        Ok(self.annotate_with_report(text, overrides)?.annotations)
    }

    pub fn annotate_with_report(
        &self,
        text: &str,
        overrides: &ConfigOverrides,
    ) -> Result<AnnotationReport, ConfigError> {
        let config = self.request_config(overrides)?;
        Ok(self.run(text, &config))
    }

    /// 多段文本共用一次合并出的配置；配置非法时整批失败。
    pub fn annotate_batch(
        &self,
        texts: &[&str],
        overrides: &ConfigOverrides,
    ) -> Result<Vec<AnnotationReport>, ConfigError> {
        let config = self.request_config(overrides)?;
        Ok(texts.iter().map(|t| self.run(t, &config)).collect())
    }

    fn request_config(&self, overrides: &ConfigOverrides) -> Result<AnnotatorConfig, ConfigError> {
        if overrides.cache_capacity.is_some() {
            return Err(ConfigError::BuildTimeOnly("cache_capacity"));
        }
        self.config.merge(overrides)
    }

    fn run(&self, text: &str, config: &AnnotatorConfig) -> AnnotationReport {
        let started = Instant::now();
        let deadline = config.time_budget().map(|d| started + d);
        let mut unavailable = Vec::new();

        let tokens = self.tokenizer.tokenize(text);
        let normalizer = Normalizer::new(self.sources.primary().normalization());
        let candidates = CandidateGenerator::new(config.min_tokens, config.max_tokens, normalizer)
            .max_candidates(config.max_candidates)
            .generate(text, &tokens);

        let expansion: Expansion = match config.matching_method {
            MatchingMethod::Exact => QueryExpander::expand_exact(&candidates.map),
            MatchingMethod::Approximate => QueryExpander::new(config.threshold, config.measure)
                .retries(config.lookup_retries)
                .deadline(deadline)
                .expand(&candidates.map, &self.sources, &mut unavailable),
        };

        let (mut annotations, resolve_truncated) =
            self.resolve(&expansion.queries, config.lookup_retries, deadline, &mut unavailable);
        log::debug!("精确查询后得到 {} 条注释", annotations.len());

        if config.top_n > 0 {
            annotations = TopNPerSpan { n: config.top_n }.apply(annotations);
        }
        if config.matching_method == MatchingMethod::Approximate {
            annotations = BestOverlapByMatch.apply(annotations);
        }
        annotations = CrossingBoundary.apply(annotations);

        // 同一 (源, 查询) 只报告一次
        let mut seen = HashSet::new();
        unavailable.retain(|u| seen.insert((u.source.clone(), u.query.clone())));

        log::debug!(
            "注释完成：{} 条，用时 {:?}",
            annotations.len(),
            started.elapsed()
        );
        AnnotationReport {
            annotations: annotations
                .iter()
                .map(|a| AnnotationRecord::from_annotation(a, config.verbose))
                .collect(),
            unavailable,
            truncated: candidates.truncated || expansion.truncated || resolve_truncated,
        }
    }

    /// 对命中串做精确查询，得到 identifier/label。超过 `deadline` 后剩余的不再查询，返回值第二项为 true。
    fn resolve(
        &self,
        queries: &[ExpandedQuery],
        retries: usize,
        deadline: Option<Instant>,
        unavailable: &mut Vec<SourceUnavailable>,
    ) -> (Vec<Annotation>, bool) {
        let mut out = Vec::new();
        for q in queries {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::warn!("时间预算耗尽，剩余命中串不再做精确查询");
                return (out, true);
            }
            for entry in self.sources.exact(&q.requested_query, retries, unavailable) {
                out.push(Annotation {
                    offset: q.offset,
                    identifier: entry.identifier,
                    label: entry.label,
                    similarity: q.similarity,
                    requested_query: q.requested_query.clone(),
                    original_query: q.original_query.clone(),
                });
            }
        }
        (out, false)
    }
}
