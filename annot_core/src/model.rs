use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 源文本中的半开区间 `[begin, end)`，单位是 Unicode 码点（不是字节）。
///
/// 约定：`begin < end`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub begin: usize,
    pub end: usize,
}

impl Offset {
    pub fn new(begin: usize, end: usize) -> Self {
        debug_assert!(begin < end, "空区间：[{begin}, {end})");
        Self { begin, end }
    }

    /// 位置 `pos` 是否落在区间内（含 begin 不含 end）。
    pub fn contains(&self, pos: usize) -> bool {
        self.begin <= pos && pos < self.end
    }

    /// 两个区间是否重叠：任一方的起点落在另一方之内。
    pub fn overlaps(&self, other: &Offset) -> bool {
        self.contains(other.begin) || other.contains(self.begin)
    }

    /// 交叉（部分重叠，且互不包含）。
    ///
    /// `(x1<y1 ∧ y1<x2<y2) ∨ (y1<x1<y2 ∧ y2<x2)`；嵌套与不相交都不算。
    pub fn crosses(&self, other: &Offset) -> bool {
        let (x1, x2) = (self.begin, self.end);
        let (y1, y2) = (other.begin, other.end);
        (x1 < y1 && y1 < x2 && x2 < y2) || (y1 < x1 && x1 < y2 && y2 < x2)
    }
}

/// 分词结果：token 文本 + 码点区间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub begin: usize,
    pub end: usize,
}

/// 候选集合：规范化后的查询串 -> 出现位置（按生成顺序：窗口长度升序，再按起点升序）。
pub type CandidateMap = BTreeMap<String, Vec<Offset>>;

/// 查询扩展的产物：每个 (命中串, offset) 一条。
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedQuery {
    /// 命中的词典规范化串
    pub requested_query: String,
    /// 原候选串
    pub original_query: String,
    pub offset: Offset,
    /// (0, 1]
    pub similarity: f64,
}

/// 词典中的一个条目（精确查询的返回值）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub label: String,
    pub identifier: String,
    /// 展示用形式（通常就是原始 label）
    pub view_form: String,
}

/// 后处理流水线中的注释单元。
///
/// `requested_query`/`original_query` 只在流水线内部使用（Pass 2 依赖它），
/// 输出时会被丢弃。
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub offset: Offset,
    pub identifier: String,
    pub label: String,
    pub similarity: f64,
    pub requested_query: String,
    pub original_query: String,
}

/// 最终输出记录：`{begin, end, obj}`；verbose 模式下附带 label/score。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub begin: usize,
    pub end: usize,
    pub obj: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl AnnotationRecord {
    pub fn from_annotation(a: &Annotation, verbose: bool) -> Self {
        Self {
            begin: a.offset.begin,
            end: a.offset.end,
            obj: a.identifier.clone(),
            label: verbose.then(|| a.label.clone()),
            score: verbose.then_some(a.similarity),
        }
    }
}

/// 词典的规范化元数据（由词典存储方提供）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationFlags {
    pub lowercased: bool,
    pub hyphen_replaced: bool,
    pub stemmed: bool,
}

/// 某个查询因查询源不可用而降级为空结果的记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUnavailable {
    pub source: String,
    pub query: String,
    pub reason: String,
}

/// 一次注释请求的完整结果。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnnotationReport {
    pub annotations: Vec<AnnotationRecord>,
    pub unavailable: Vec<SourceUnavailable>,
    /// 候选数上限或时间预算导致提前截断
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_excludes_nesting_and_disjoint() {
        assert!(Offset::new(0, 10).crosses(&Offset::new(5, 15)));
        assert!(Offset::new(5, 15).crosses(&Offset::new(0, 10)));
        assert!(!Offset::new(0, 10).crosses(&Offset::new(2, 8)));
        assert!(!Offset::new(0, 5).crosses(&Offset::new(6, 10)));
        assert!(!Offset::new(0, 5).crosses(&Offset::new(5, 10)));
        assert!(!Offset::new(0, 5).crosses(&Offset::new(0, 8)));
    }

    #[test]
    fn overlap_uses_begin_containment() {
        assert!(Offset::new(0, 5).overlaps(&Offset::new(2, 7)));
        assert!(Offset::new(2, 7).overlaps(&Offset::new(0, 5)));
        assert!(!Offset::new(0, 5).overlaps(&Offset::new(5, 7)));
    }

    #[test]
    fn verbose_record_keeps_label_and_score() {
        let a = Annotation {
            offset: Offset::new(0, 10),
            identifier: "ID1".into(),
            label: "NF-kappa B".into(),
            similarity: 1.0,
            requested_query: "nf-kappa b".into(),
            original_query: "nf-kappa b".into(),
        };
        let plain = AnnotationRecord::from_annotation(&a, false);
        assert_eq!(plain.label, None);
        assert_eq!(plain.score, None);
        let verbose = AnnotationRecord::from_annotation(&a, true);
        assert_eq!(verbose.label.as_deref(), Some("NF-kappa B"));
        assert_eq!(verbose.score, Some(1.0));
    }
}
