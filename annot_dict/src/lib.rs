use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::{fs, io, path::Path};

use annot_core::candidate::Normalizer;
use annot_core::similarity::{GramSet, Measure, NgramSimilarity, score};
use annot_core::{DictionaryEntry, LookupError, LookupSource, NormalizationFlags};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictError {
    #[error("读取词典失败：{0}")]
    Io(#[from] io::Error),
    #[error("TSV 第 {line} 行缺少 label/identifier")]
    MissingField { line: usize },
}

/// TSV 格式（简化版）：
///
/// - `label<TAB>identifier`
/// - 允许 `#` 开头注释行
///
/// key 是按 `NormalizationFlags` 规范化后的 label，与候选生成使用同一个规范化器。
/// 近似查询按调用方给的度量在全部 key 上线性扫描（n-gram 集合在加载时预先算好）。
#[derive(Debug)]
pub struct TsvDictionary {
    name: String,
    flags: NormalizationFlags,
    map: BTreeMap<String, Vec<DictionaryEntry>>,
    grams: Vec<(String, GramSet)>,
    similarity: NgramSimilarity,
}

impl TsvDictionary {
    pub fn from_path(path: impl AsRef<Path>, flags: NormalizationFlags) -> Result<Self, DictError> {
        let s = fs::read_to_string(path)?;
        Self::from_tsv_str(&s, flags)
    }

    pub fn from_tsv_str(s: &str, flags: NormalizationFlags) -> Result<Self, DictError> {
        let normalizer = Normalizer::new(flags);
        let mut map: BTreeMap<String, Vec<DictionaryEntry>> = BTreeMap::new();

        for (idx, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut it = line.split('\t');
            let label = it.next().unwrap_or("").trim();
            let identifier = it.next().unwrap_or("").trim();
            if label.is_empty() || identifier.is_empty() {
                return Err(DictError::MissingField { line: idx + 1 });
            }
            let entry = DictionaryEntry {
                label: label.to_string(),
                identifier: identifier.to_string(),
                view_form: label.to_string(),
            };
            let entries = map.entry(normalizer.normalize(label)).or_default();
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }

        let similarity = NgramSimilarity::default();
        let grams = map
            .keys()
            .map(|k| (k.clone(), similarity.ngrams(k)))
            .collect();
        log::debug!("词典加载完成：{} 个 key", map.len());

        Ok(Self {
            name: "dictionary".to_string(),
            flags,
            map,
            grams,
            similarity,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 不同 key 的数量。
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}

impl LookupSource for TsvDictionary {
    fn name(&self) -> &str {
        &self.name
    }

    fn normalization(&self) -> NormalizationFlags {
        self.flags
    }

    fn retrieve_similar(
        &self,
        query: &str,
        measure: Measure,
        threshold: f64,
    ) -> Result<BTreeSet<String>, LookupError> {
        let q = self.similarity.ngrams(query);
        Ok(self
            .grams
            .iter()
            .filter(|(_, g)| score(measure, &q, g) >= threshold)
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn retrieve_exact(&self, key: &str) -> Result<Vec<DictionaryEntry>, LookupError> {
        Ok(self.map.get(key).cloned().unwrap_or_default())
    }
}

/// 词级三元组集合：小写后按非字母数字切词，每个词前补两个空格、后补一个空格。
///
/// 同一三元组只计一次（集合语义，不区分出现次数）。
pub fn word_trigrams(s: &str) -> HashSet<String> {
    let lower = s.to_lowercase();
    let mut out = HashSet::new();
    for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let padded: Vec<char> = "  ".chars().chain(word.chars()).chain(" ".chars()).collect();
        for w in padded.windows(3) {
            out.insert(w.iter().collect());
        }
    }
    out
}

/// 三元组相似度：`|A∩B| / |A∪B|`，任一侧为空时为 0。
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let x = word_trigrams(a);
    let y = word_trigrams(b);
    if x.is_empty() || y.is_empty() {
        return 0.0;
    }
    let inter = x.intersection(&y).count() as f64;
    inter / (x.len() as f64 + y.len() as f64 - inter)
}

/// 固定打分的查询源：忽略调用方的度量，一律用词级三元组相似度。
///
/// 它的分数与 n-gram 度量不可比，调用方需要用自己的度量重新打分。
#[derive(Debug)]
pub struct TrigramDictionary {
    inner: TsvDictionary,
}

impl TrigramDictionary {
    pub fn new(inner: TsvDictionary) -> Self {
        Self { inner }
    }
}

impl LookupSource for TrigramDictionary {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn normalization(&self) -> NormalizationFlags {
        self.inner.normalization()
    }

    fn retrieve_similar(
        &self,
        query: &str,
        _measure: Measure,
        threshold: f64,
    ) -> Result<BTreeSet<String>, LookupError> {
        Ok(self
            .inner
            .keys()
            .filter(|k| trigram_similarity(query, k) >= threshold)
            .map(str::to_string)
            .collect())
    }

    fn retrieve_exact(&self, key: &str) -> Result<Vec<DictionaryEntry>, LookupError> {
        self.inner.retrieve_exact(key)
    }
}
