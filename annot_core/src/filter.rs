//! `filter`：注释后处理（三个按顺序、彼此独立的 pass）。
//!
//! - `TopNPerSpan`：同一 span 只保留相似度最高的 n 个
//! - `BestOverlapByMatch`：同一命中串的重叠注释中，丢弃相似度严格更低的
//! - `CrossingBoundary`：交叉（部分重叠）的注释中，右侧的胜出

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::{Annotation, Offset};

/// Filter：对注释列表做后处理。
pub trait Filter: Send + Sync {
    fn apply(&self, annotations: Vec<Annotation>) -> Vec<Annotation>;
}

/// Pass 1：按 offset 分组，组内按相似度降序（稳定排序），保留前 n 个。`n == 0` 不过滤。
///
/// 输出按 offset 升序分组。
pub struct TopNPerSpan {
    pub n: usize,
}

impl Filter for TopNPerSpan {
    fn apply(&self, annotations: Vec<Annotation>) -> Vec<Annotation> {
        if self.n == 0 {
            return annotations;
        }
        let mut groups: BTreeMap<Offset, Vec<Annotation>> = BTreeMap::new();
        for a in annotations {
            groups.entry(a.offset).or_default().push(a);
        }
        groups
            .into_values()
            .flat_map(|mut group| {
                group.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
                group.truncate(self.n);
                group
            })
            .collect()
    }
}

/// Pass 2 的排序键：`(requested_query, begin, end, similarity, original_query)`，全部升序。
///
/// 只用来让扫描顺序确定，不影响结果集合。
fn match_order(a: &Annotation, b: &Annotation) -> Ordering {
    a.requested_query
        .cmp(&b.requested_query)
        .then(a.offset.begin.cmp(&b.offset.begin))
        .then(a.offset.end.cmp(&b.offset.end))
        .then(a.similarity.total_cmp(&b.similarity))
        .then_with(|| a.original_query.cmp(&b.original_query))
}

/// Pass 2：同一命中串、区间重叠时，若存在相似度严格更高者则丢弃自己。
///
/// 相同最高分不做裁决，可能留下多个。两两比较，O(k²)。
pub struct BestOverlapByMatch;

impl Filter for BestOverlapByMatch {
    fn apply(&self, mut annotations: Vec<Annotation>) -> Vec<Annotation> {
        annotations.sort_by(match_order);
        let keep: Vec<bool> = annotations
            .iter()
            .enumerate()
            .map(|(i, a)| {
                !annotations.iter().enumerate().any(|(j, b)| {
                    i != j
                        && a.requested_query == b.requested_query
                        && a.offset.overlaps(&b.offset)
                        && b.similarity > a.similarity
                })
            })
            .collect();
        annotations
            .into_iter()
            .zip(keep)
            .filter_map(|(a, k)| k.then_some(a))
            .collect()
    }
}

/// Pass 3：按 `(begin, end)` 升序扫描；若某注释与后面任一注释交叉，则丢弃它。
///
/// `target.begin >= pivot.end` 时停止向后扫描。嵌套/包含不算交叉，两者都保留。
pub struct CrossingBoundary;

impl Filter for CrossingBoundary {
    fn apply(&self, mut annotations: Vec<Annotation>) -> Vec<Annotation> {
        annotations.sort_by(|a, b| a.offset.cmp(&b.offset));
        let keep: Vec<bool> = (0..annotations.len())
            .map(|i| {
                let pivot = annotations[i].offset;
                !annotations[i + 1..]
                    .iter()
                    .take_while(|t| t.offset.begin < pivot.end)
                    .any(|t| pivot.crosses(&t.offset))
            })
            .collect();
        annotations
            .into_iter()
            .zip(keep)
            .filter_map(|(a, k)| k.then_some(a))
            .collect()
    }
}
