//! `similarity`：字符 n-gram 相似度（cosine / dice / jaccard / overlap / exact）。
//!
//! 重复出现的 n-gram 以 `(gram, 出现序号)` 形式放入集合，
//! 用普通集合运算得到多重集交集的语义。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 边界哨兵：私有区字符，不会出现在正常文本中。
pub const SENTINEL: char = '\u{E000}';

/// 相似度度量（封闭枚举）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Exact,
    Cosine,
    Dice,
    Jaccard,
    Overlap,
}

impl Measure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measure::Exact => "exact",
            Measure::Cosine => "cosine",
            Measure::Dice => "dice",
            Measure::Jaccard => "jaccard",
            Measure::Overlap => "overlap",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Measure {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Measure::Exact),
            "cosine" => Ok(Measure::Cosine),
            "dice" => Ok(Measure::Dice),
            "jaccard" => Ok(Measure::Jaccard),
            "overlap" => Ok(Measure::Overlap),
            _ => Err(ConfigError::UnknownMeasure(s.to_string())),
        }
    }
}

/// n-gram 特征集合。
pub type GramSet = HashSet<(String, u32)>;

/// n-gram 相似度计算器。
#[derive(Debug, Clone, Copy)]
pub struct NgramSimilarity {
    n: usize,
    mark_boundaries: bool,
}

impl Default for NgramSimilarity {
    fn default() -> Self {
        Self {
            n: 3,
            mark_boundaries: true,
        }
    }
}

impl NgramSimilarity {
    /// 关闭首尾边界标记（短于 n 的串仍会右补哨兵到长度 n）。
    pub fn without_boundaries(mut self) -> Self {
        self.mark_boundaries = false;
        self
    }

    pub fn ngrams(&self, s: &str) -> GramSet {
        let n = self.n;
        let mut chars: Vec<char> = Vec::with_capacity(s.len() + 2 * n);
        if self.mark_boundaries {
            chars.extend(std::iter::repeat(SENTINEL).take(n - 1));
            chars.extend(s.chars());
            chars.extend(std::iter::repeat(SENTINEL).take(n - 1));
        } else {
            chars.extend(s.chars());
            while chars.len() < n {
                chars.push(SENTINEL);
            }
        }

        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut out = GramSet::new();
        for w in chars.windows(n) {
            let gram: String = w.iter().collect();
            let count = seen.entry(gram.clone()).or_insert(0);
            out.insert((gram, *count));
            *count += 1;
        }
        out
    }

    pub fn similarity(&self, measure: Measure, a: &str, b: &str) -> f64 {
        let x = self.ngrams(a);
        let y = self.ngrams(b);
        score(measure, &x, &y)
    }

    pub fn cosine(&self, a: &str, b: &str) -> f64 {
        self.similarity(Measure::Cosine, a, b)
    }

    pub fn jaccard(&self, a: &str, b: &str) -> f64 {
        self.similarity(Measure::Jaccard, a, b)
    }

    pub fn overlap(&self, a: &str, b: &str) -> f64 {
        self.similarity(Measure::Overlap, a, b)
    }

    pub fn dice(&self, a: &str, b: &str) -> f64 {
        self.similarity(Measure::Dice, a, b)
    }
}

/// 在两个 n-gram 集合上计算度量；空集合得 0。
pub fn score(measure: Measure, x: &GramSet, y: &GramSet) -> f64 {
    if x.is_empty() || y.is_empty() {
        return 0.0;
    }
    let inter = x.intersection(y).count() as f64;
    let (nx, ny) = (x.len() as f64, y.len() as f64);
    match measure {
        Measure::Exact => {
            if x == y {
                1.0
            } else {
                0.0
            }
        }
        Measure::Cosine => inter / (nx * ny).sqrt(),
        Measure::Dice => 2.0 * inter / (nx + ny),
        Measure::Jaccard => inter / (nx + ny - inter),
        Measure::Overlap => inter / nx.min(ny),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [Measure; 5] = [
        Measure::Exact,
        Measure::Cosine,
        Measure::Dice,
        Measure::Jaccard,
        Measure::Overlap,
    ];

    #[test]
    fn padded_trigrams() {
        let grams = NgramSimilarity::default().ngrams("ab");
        // "##ab##" -> ##a, #ab, ab#, b##
        assert_eq!(grams.len(), 4);
        assert!(grams.contains(&(format!("{SENTINEL}{SENTINEL}a"), 0)));
        assert!(grams.contains(&(format!("b{SENTINEL}{SENTINEL}"), 0)));
    }

    #[test]
    fn repeated_grams_are_disambiguated() {
        let grams = NgramSimilarity::default().without_boundaries().ngrams("aaaa");
        assert_eq!(grams.len(), 2);
        assert!(grams.contains(&("aaa".to_string(), 0)));
        assert!(grams.contains(&("aaa".to_string(), 1)));
    }

    #[test]
    fn short_string_without_boundaries_is_right_padded() {
        let grams = NgramSimilarity::default().without_boundaries().ngrams("a");
        assert_eq!(grams.len(), 1);
        assert!(grams.contains(&(format!("a{SENTINEL}{SENTINEL}"), 0)));
    }

    #[test]
    fn known_values() {
        let sim = NgramSimilarity::default();
        // "abc" 与 "abd"：各 5 个 trigram，共享 ##a、#ab
        assert!((sim.jaccard("abc", "abd") - 2.0 / 8.0).abs() < 1e-12);
        assert!((sim.cosine("abc", "abd") - 2.0 / 5.0).abs() < 1e-12);
        assert!((sim.dice("abc", "abd") - 4.0 / 10.0).abs() < 1e-12);
        assert!((sim.overlap("abc", "abd") - 2.0 / 5.0).abs() < 1e-12);
        assert_eq!(sim.similarity(Measure::Exact, "abc", "abd"), 0.0);
    }

    #[test]
    fn multiset_semantics() {
        // "aaa" 的 trigram 中 "aaa" 只有 1 次，"aaaa" 中有 2 次；交集只算 1 次
        let sim = NgramSimilarity::default();
        let j = sim.jaccard("aaa", "aaaa");
        // aaa: ##a #aa aaa aa# a## (5) ; aaaa: ##a #aa aaa aaa aa# a## (6)
        assert!((j - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn parse_measure() {
        assert_eq!("Jaccard".parse::<Measure>(), Ok(Measure::Jaccard));
        assert_eq!(
            "levenshtein".parse::<Measure>(),
            Err(ConfigError::UnknownMeasure("levenshtein".into()))
        );
    }

    proptest! {
        #[test]
        fn identity_bounds_symmetry(a in "[a-z0-9 -]{1,20}", b in "[a-z0-9 -]{0,20}") {
            let sim = NgramSimilarity::default();
            for m in ALL {
                prop_assert!((sim.similarity(m, &a, &a) - 1.0).abs() < 1e-12);
                let ab = sim.similarity(m, &a, &b);
                let ba = sim.similarity(m, &b, &a);
                prop_assert!((0.0..=1.0 + 1e-12).contains(&ab));
                prop_assert!((ab - ba).abs() < 1e-12);
            }
        }
    }
}
