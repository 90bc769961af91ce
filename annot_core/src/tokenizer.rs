//! `tokenizer`：把原文切成 token，并给出精确的码点区间。
//!
//! 做法：先按空白/非单词字符/下划线切开，再从“上一个 token 的结束位置”之后
//! 依次查找每个 token 的下一次出现。这样同一个词重复出现时 offset 也不会错位。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Token;

static SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\W_]+").expect("valid regex"));

/// 分词器：无状态，可复用。
#[derive(Debug, Default, Clone, Copy)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut out = Vec::new();
        // 游标：上一个 token 结束处的 (字节位置, 码点位置)
        let mut byte_cursor = 0usize;
        let mut char_cursor = 0usize;

        for word in SEPARATOR.split(text).filter(|w| !w.is_empty()) {
            let rest = &text[byte_cursor..];
            let Some(found) = rest.find(word) else {
                // split 出来的片段一定还在剩余文本中
                log::warn!("token {word:?} 在 {byte_cursor} 之后找不到，跳过");
                continue;
            };
            let begin = char_cursor + rest[..found].chars().count();
            let end = begin + word.chars().count();
            out.push(Token {
                text: word.to_string(),
                begin,
                end,
            });
            byte_cursor += found + word.len();
            char_cursor = end;
        }

        out
    }
}

/// 按码点区间截取原文。越界部分会被截断。
pub fn slice_chars(text: &str, begin: usize, end: usize) -> String {
    text.chars().skip(begin).take(end.saturating_sub(begin)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_punctuation_and_underscore() {
        let tokens = Tokenizer::new().tokenize("NF-kappa B_activity (p65).");
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["NF", "kappa", "B", "activity", "p65"]);
        assert_eq!((tokens[0].begin, tokens[0].end), (0, 2));
        assert_eq!((tokens[1].begin, tokens[1].end), (3, 8));
        assert_eq!((tokens[2].begin, tokens[2].end), (9, 10));
    }

    #[test]
    fn repeated_words_get_increasing_offsets() {
        let tokens = Tokenizer::new().tokenize("gene gene, gene");
        let offsets: Vec<(usize, usize)> = tokens.iter().map(|t| (t.begin, t.end)).collect();
        assert_eq!(offsets, vec![(0, 4), (5, 9), (11, 15)]);
    }

    #[test]
    fn prefix_of_later_word_is_not_misplaced() {
        // "a" 也出现在 "ab" 里，但第二个 "a" 必须定位在第一个 "a" 之后
        let tokens = Tokenizer::new().tokenize("ab a");
        assert_eq!((tokens[1].text.as_str(), tokens[1].begin), ("a", 3));
    }

    #[test]
    fn offsets_are_codepoints() {
        let tokens = Tokenizer::new().tokenize("café costs €50");
        assert_eq!((tokens[0].begin, tokens[0].end), (0, 4));
        assert_eq!((tokens[1].begin, tokens[1].end), (5, 10));
        assert_eq!((tokens[2].text.as_str(), tokens[2].begin), ("50", 12));
    }

    #[test]
    fn empty_and_separator_only_text() {
        assert!(Tokenizer::new().tokenize("").is_empty());
        assert!(Tokenizer::new().tokenize(" -_- ").is_empty());
    }

    proptest! {
        #[test]
        fn slices_match_tokens(text in "[a-zA-Z0-9 ,._()é-]{0,60}") {
            let tokens = Tokenizer::new().tokenize(&text);
            let mut last_end = 0usize;
            for (i, t) in tokens.iter().enumerate() {
                prop_assert_eq!(slice_chars(&text, t.begin, t.end), t.text.clone());
                prop_assert!(t.begin < t.end);
                if i > 0 {
                    prop_assert!(t.begin >= last_end);
                }
                last_end = t.end;
            }
        }
    }
}
