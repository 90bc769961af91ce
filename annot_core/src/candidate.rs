//! `candidate`：滑动窗口生成候选查询串。
//!
//! 流程：token 序列 -> 每个窗口取原文切片 -> 停用词过滤 -> 规范化 -> 按规范化串聚合 offset。

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use crate::model::{CandidateMap, NormalizationFlags, Offset, Token};
use crate::tokenizer::Tokenizer;

/// 固定停用词表（大小写不敏感的整串匹配）。
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each",
    "either", "even", "every", "few", "for", "from", "further", "had", "has", "have", "having",
    "he", "her", "here", "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "may", "me", "might", "more", "most", "much", "must", "my", "neither", "no", "nor", "not",
    "of", "off", "on", "once", "only", "or", "other", "ought", "our", "out", "over", "own",
    "same", "shall", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "through", "to", "too", "under",
    "until", "up", "upon", "very", "via", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "within", "without", "would", "you", "your",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());
static ARTICLE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(the|a|an) ").expect("valid regex"));
static EDGE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-(),.]|[-(),.]$").expect("valid regex"));
static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static DIGIT_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d[a-zA-Z]$").expect("valid regex"));
static STEMMER: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));

/// 停用词判定：命中任一规则即拒绝该窗口。
pub fn is_stopword(s: &str) -> bool {
    if s.chars().count() <= 1 {
        return true;
    }
    if STOPWORD_SET.contains(s.to_lowercase().as_str()) {
        return true;
    }
    ARTICLE_PREFIX.is_match(s) || EDGE_PUNCT.is_match(s) || NUMERIC.is_match(s) || DIGIT_LETTER.is_match(s)
}

/// 规范化器：按词典元数据决定是否词干化/小写化/连字符替换。
///
/// 顺序固定为：词干化（保留原始分隔符） -> 小写 -> `-` 替换为空格。
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    flags: NormalizationFlags,
    tokenizer: Tokenizer,
}

impl Normalizer {
    pub fn new(flags: NormalizationFlags) -> Self {
        Self {
            flags,
            tokenizer: Tokenizer::new(),
        }
    }

    pub fn normalize(&self, s: &str) -> String {
        let mut out = if self.flags.stemmed {
            self.stem_preserving_separators(s)
        } else {
            s.to_string()
        };
        if self.flags.lowercased {
            out = out.to_lowercase();
        }
        if self.flags.hyphen_replaced {
            out = out.replace('-', " ");
        }
        out
    }

    /// 逐个 token 词干化，token 之间的原始字符原样保留。
    fn stem_preserving_separators(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        for token in self.tokenizer.tokenize(s) {
            let Some(at) = rest.find(token.text.as_str()) else {
                continue;
            };
            out.push_str(&rest[..at]);
            out.push_str(&STEMMER.stem(&token.text));
            rest = &rest[at + token.text.len()..];
        }
        out.push_str(rest);
        out
    }
}

/// 候选生成结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    pub map: CandidateMap,
    /// 触达 `max_candidates` 上限后有窗口被丢弃
    pub truncated: bool,
}

/// 滑动窗口候选生成器。
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    min_tokens: usize,
    max_tokens: usize,
    normalizer: Normalizer,
    /// 不同候选串的数量上限；None 表示不限
    max_candidates: Option<usize>,
}

impl CandidateGenerator {
    pub fn new(min_tokens: usize, max_tokens: usize, normalizer: Normalizer) -> Self {
        Self {
            min_tokens: min_tokens.max(1),
            max_tokens: max_tokens.max(min_tokens.max(1)),
            normalizer,
            max_candidates: None,
        }
    }

    pub fn max_candidates(mut self, limit: usize) -> Self {
        self.max_candidates = (limit > 0).then_some(limit);
        self
    }

    pub fn generate(&self, text: &str, tokens: &[Token]) -> Candidates {
        let mut out = Candidates::default();
        // 码点 -> 字节的映射，窗口切片直接用字节区间
        let byte_at: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();

        for window in self.min_tokens..=self.max_tokens {
            if window > tokens.len() {
                break;
            }
            for start in 0..=(tokens.len() - window) {
                let first = &tokens[start];
                let last = &tokens[start + window - 1];
                let slice = &text[byte_at[first.begin]..byte_at[last.end]];
                if is_stopword(slice) {
                    continue;
                }
                let key = self.normalizer.normalize(slice);
                let offset = Offset::new(first.begin, last.end);
                if let Some(offsets) = out.map.get_mut(&key) {
                    offsets.push(offset);
                    continue;
                }
                if self.max_candidates.is_some_and(|limit| out.map.len() >= limit) {
                    out.truncated = true;
                    continue;
                }
                out.map.insert(key, vec![offset]);
            }
        }

        if out.truncated {
            log::warn!("候选数达到上限 {:?}，部分窗口被丢弃", self.max_candidates);
        }
        log::debug!("生成候选 {} 个（{} 个 token）", out.map.len(), tokens.len());
        out
    }
}
