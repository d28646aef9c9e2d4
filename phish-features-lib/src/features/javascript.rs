//! Lexical features of JavaScript source.
//!
//! Counts of suspicious API calls, obfuscation markers and character-class
//! shares. All lengths and shares are measured in characters.

use super::{shannon_entropy, FeatureExtractor};
use crate::types::FeatureVector;
use regex::Regex;

/// Output keys of [`JsFeatureExtractor`], in column order.
pub const JS_FEATURE_NAMES: &[&str] = &[
    "eval_count",
    "function_count",
    "document_write",
    "setTimeout",
    "length",
    "entropy",
    "iframe_count",
    "window_location",
    "createElement_count",
    "appendChild_count",
    "dispatchEvent_count",
    "onmouseover_count",
    "fromCharCode_count",
    "charCodeAt_count",
    "escape_count",
    "unescape_count",
    "digit_count",
    "hex_count",
    "backslash_count",
    "pipe_count",
    "percent_count",
    "curly_brace_count",
    "space_count",
    "parseInt_count",
    "classid_count",
    "ActiveXObject_count",
    "concat_count",
    "indexOf_count",
    "substring_count",
    "replace_count",
    "addEventListener_count",
    "attachEvent_count",
    "getElementById_count",
    "search_count",
    "split_count",
    "onerror_count",
    "onload_count",
    "onbeforeunload_count",
    "setAttribute_count",
    "charAt_count",
    "consoleLog_count",
    "js_file_count",
    "php_file_count",
    "random_count",
    "decode_count",
    "toString_count",
    "encoded_char_count",
    "long_string_count",
    "max_word_length",
    "min_word_length",
    "entropy_longest_word",
    "popup_window",
    "right_clic",
    "share_of_digits",
    "share_of_hex",
    "share_of_backslash",
    "share_of_pipe",
    "share_of_percent",
    "share_of_curly_braces",
    "share_of_spaces",
    "unsafe_anchor_percent",
];

/// `min_word_length` when the script has no words at all.
const NO_WORD_MIN_LENGTH: usize = 1000;

lazy_static::lazy_static! {
    /// Pattern-count features, in output order.
    static ref PATTERN_COUNTS: Vec<(&'static str, Regex)> = [
        ("eval_count", r"\beval\s*\("),
        ("function_count", r"\bfunction\b"),
        ("document_write", r"document\.write\s*\("),
        ("setTimeout", r"setTimeout\s*\("),
        ("iframe_count", r"(?i)iframe"),
        ("window_location", r"(?i)window\.location"),
        ("createElement_count", r"createElement\s*\("),
        ("appendChild_count", r"appendChild\s*\("),
        ("dispatchEvent_count", r"dispatchEvent\s*\("),
        ("onmouseover_count", r"onmouseover"),
        ("fromCharCode_count", r"fromCharCode\s*\("),
        ("charCodeAt_count", r"charCodeAt\s*\("),
        ("escape_count", r"escape\s*\("),
        ("unescape_count", r"unescape\s*\("),
        ("parseInt_count", r"\bparseInt\s*\("),
        ("classid_count", r"(?i)classid"),
        ("ActiveXObject_count", r"ActiveXObject\s*\("),
        ("concat_count", r"\.concat\s*\("),
        ("indexOf_count", r"\.indexOf\s*\("),
        ("substring_count", r"\.substring\s*\("),
        ("replace_count", r"\.replace\s*\("),
        ("addEventListener_count", r"\.addEventListener\s*\("),
        ("attachEvent_count", r"\.attachEvent\s*\("),
        ("getElementById_count", r"getElementById\s*\("),
        ("search_count", r"\.search\s*\("),
        ("split_count", r"\.split\s*\("),
        ("onerror_count", r"(?i)onerror"),
        ("onload_count", r"(?i)onload"),
        ("onbeforeunload_count", r"(?i)onbeforeunload"),
        ("setAttribute_count", r"\.setAttribute\s*\("),
        ("charAt_count", r"\.charAt\s*\("),
        ("consoleLog_count", r"console\.log\s*\("),
        ("js_file_count", r#"\.js["']"#),
        ("php_file_count", r#"\.php["']"#),
        ("random_count", r"Math\.random\s*\("),
        ("decode_count", r"decode(?:URI|URIComponent)?\s*\("),
        ("toString_count", r"\.toString\s*\("),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("static pattern")))
    .collect();

    static ref DIGIT: Regex = Regex::new(r"\d").expect("static pattern");
    static ref HEX_LITERAL: Regex = Regex::new(r"0x[0-9a-fA-F]+").expect("static pattern");
    static ref HEX_ESCAPE: Regex = Regex::new(r"\\x[0-9a-fA-F]{2}").expect("static pattern");
    static ref UNICODE_ESCAPE: Regex = Regex::new(r"\\u[0-9a-fA-F]{4}").expect("static pattern");
    static ref LONG_STRING: Regex = Regex::new(r#"["']([^"']{200,})["']"#).expect("static pattern");
    static ref WORD: Regex = Regex::new(r"\w+").expect("static pattern");
    static ref RIGHT_CLICK: Regex = Regex::new(r"event\.button\s*==\s*2").expect("static pattern");
    static ref ANCHOR_TAG: Regex = Regex::new(r"(?i)<a\b[^>]*>").expect("static pattern");
}

/// Default extractor for the script pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsFeatureExtractor;

impl JsFeatureExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureExtractor for JsFeatureExtractor {
    fn feature_names(&self) -> Vec<String> {
        JS_FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
    }

    fn extract(&self, text: &str) -> FeatureVector {
        let counts: Vec<(&str, f64)> = PATTERN_COUNTS
            .iter()
            .map(|(name, regex)| (*name, regex.find_iter(text).count() as f64))
            .collect();
        let count_of = |key: &str| {
            counts
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| *value)
                .unwrap_or(0.0)
        };

        let length = text.chars().count();
        let digit_count = DIGIT.find_iter(text).count() as f64;
        let hex_count = HEX_LITERAL.find_iter(text).count() as f64;
        let backslash_count = text.matches('\\').count() as f64;
        let pipe_count = text.matches('|').count() as f64;
        let percent_count = text.matches('%').count() as f64;
        let curly_brace_count = (text.matches('{').count() + text.matches('}').count()) as f64;
        let space_count = text.matches(' ').count() as f64;

        let encoded_char_count =
            (HEX_ESCAPE.find_iter(text).count() + UNICODE_ESCAPE.find_iter(text).count()) as f64;
        let long_string_count = LONG_STRING.find_iter(text).count() as f64;

        let (longest_word, max_word_length, min_word_length) = word_lengths(text);

        let mut features = FeatureVector::with_capacity(JS_FEATURE_NAMES.len());
        for name in JS_FEATURE_NAMES {
            let value = match *name {
                "length" => length as f64,
                "entropy" => shannon_entropy(text),
                "digit_count" => digit_count,
                "hex_count" => hex_count,
                "backslash_count" => backslash_count,
                "pipe_count" => pipe_count,
                "percent_count" => percent_count,
                "curly_brace_count" => curly_brace_count,
                "space_count" => space_count,
                "encoded_char_count" => encoded_char_count,
                "long_string_count" => long_string_count,
                "max_word_length" => max_word_length as f64,
                "min_word_length" => min_word_length as f64,
                "entropy_longest_word" => shannon_entropy(longest_word),
                "popup_window" => flag(text.to_lowercase().contains("prompt(")),
                "right_clic" => flag(RIGHT_CLICK.is_match(text)),
                "share_of_digits" => share(digit_count, length),
                "share_of_hex" => share(hex_count, length),
                "share_of_backslash" => share(backslash_count, length),
                "share_of_pipe" => share(pipe_count, length),
                "share_of_percent" => share(percent_count, length),
                "share_of_curly_braces" => share(curly_brace_count, length),
                "share_of_spaces" => share(space_count, length),
                "unsafe_anchor_percent" => unsafe_anchor_percent(text),
                other => count_of(other),
            };
            features.insert(*name, value);
        }

        features
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Count over total characters; an empty script counts as one character.
fn share(count: f64, length: usize) -> f64 {
    count / length.max(1) as f64
}

/// Longest word (first one on ties), its length, and the shortest length.
fn word_lengths(text: &str) -> (&str, usize, usize) {
    let mut longest = "";
    let mut max_len = 0;
    let mut min_len = NO_WORD_MIN_LENGTH;

    for word in WORD.find_iter(text).map(|m| m.as_str()) {
        let len = word.chars().count();
        if len > max_len {
            max_len = len;
            longest = word;
        }
        min_len = min_len.min(len);
    }

    (longest, max_len, min_len)
}

/// Percentage of `<a>` tags opening a new tab without `noopener`/`noreferrer`.
fn unsafe_anchor_percent(text: &str) -> f64 {
    let mut total = 0usize;
    let mut unsafe_count = 0usize;

    for tag in ANCHOR_TAG.find_iter(text) {
        total += 1;
        let tag = tag.as_str().to_lowercase();
        if tag.contains("target=\"_blank\"")
            && !tag.contains("rel=\"noopener")
            && !tag.contains("rel=\"noreferrer")
        {
            unsafe_count += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    unsafe_count as f64 / total as f64 * 100.0
}
