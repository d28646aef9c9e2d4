//! HTML page parsing and page-structure features.
//!
//! [`PageDocument::parse`] reduces a page to the pieces the pipelines need
//! (links, scripts, forms, inputs, visible text). The parsed DOM is dropped
//! before the call returns, so a `PageDocument` can be held across awaits.

use crate::types::FeatureVector;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Output keys of [`html_page_features`], in column order.
pub const HTML_FEATURE_NAMES: &[&str] = &[
    "num_links",
    "num_forms",
    "num_inputs",
    "num_scripts",
    "num_iframes",
    "has_login",
    "num_meta",
    "text_length",
    "has_password_field",
    "has_https_links",
    "external_script_ratio",
    "external_links_ratio",
    "has_sensitive_keywords",
    "num_exclamations",
    "num_uppercase_words",
    "avg_link_length",
    "num_divs",
    "num_images",
    "num_inline_styles",
    "num_css_files",
    "num_external_css",
];

lazy_static::lazy_static! {
    static ref ANCHOR: Selector = selector("a");
    static ref SCRIPT: Selector = selector("script");
    static ref FORM: Selector = selector("form");
    static ref INPUT: Selector = selector("input");
    static ref PASSWORD_INPUT: Selector = selector(r#"input[type="password"]"#);
    static ref IFRAME: Selector = selector("iframe");
    static ref META: Selector = selector("meta");
    static ref DIV: Selector = selector("div");
    static ref IMAGE: Selector = selector("img");
    static ref STYLED: Selector = selector("[style]");
    static ref STYLESHEET: Selector = selector(r#"link[rel~="stylesheet"]"#);

    static ref LOGIN: Regex = Regex::new(r"(?i)login").expect("static pattern");
    static ref SENSITIVE: Regex =
        Regex::new(r"(?i)(bank|verify|account|secure|update|confirm)").expect("static pattern");
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// A `<script>` element of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTag {
    /// Script body written in the page
    Inline(String),
    /// Value of a non-empty `src` attribute, unresolved
    External(String),
}

/// Structural summary of one HTML page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDocument {
    /// `href` of every `<a>`, empty when the attribute is missing
    pub links: Vec<String>,
    pub scripts: Vec<ScriptTag>,
    /// `src` of every `<script>` carrying the attribute, empty values included
    pub script_sources: Vec<String>,
    pub forms: usize,
    pub inputs: usize,
    pub password_inputs: usize,
    pub iframes: usize,
    pub meta: usize,
    pub divs: usize,
    pub images: usize,
    /// Elements carrying a `style` attribute
    pub inline_styles: usize,
    /// `href` of every `<link rel="stylesheet">` that has one
    pub stylesheets: Vec<String>,
    /// Visible text: stripped text nodes outside script/style, space separated
    pub text: String,
    /// Every text node of the document, script and style bodies included
    pub strings: Vec<String>,
}

impl PageDocument {
    pub fn parse(body: &str) -> Self {
        let document = Html::parse_document(body);

        let links = document
            .select(&ANCHOR)
            .map(|a| a.value().attr("href").unwrap_or("").to_string())
            .collect();

        let scripts = document
            .select(&SCRIPT)
            .map(|script| match script.value().attr("src") {
                Some(src) if !src.trim().is_empty() => ScriptTag::External(src.trim().to_string()),
                _ => ScriptTag::Inline(script.text().collect()),
            })
            .collect();

        let script_sources = document
            .select(&SCRIPT)
            .filter_map(|script| script.value().attr("src"))
            .map(str::to_string)
            .collect();

        let stylesheets = document
            .select(&STYLESHEET)
            .filter_map(|link| link.value().attr("href"))
            .filter(|href| !href.is_empty())
            .map(str::to_string)
            .collect();

        let (text, strings) = collect_text(document.root_element());

        Self {
            links,
            scripts,
            script_sources,
            forms: document.select(&FORM).count(),
            inputs: document.select(&INPUT).count(),
            password_inputs: document.select(&PASSWORD_INPUT).count(),
            iframes: document.select(&IFRAME).count(),
            meta: document.select(&META).count(),
            divs: document.select(&DIV).count(),
            images: document.select(&IMAGE).count(),
            inline_styles: document.select(&STYLED).count(),
            stylesheets,
            text,
            strings,
        }
    }

    /// Non-empty inline script bodies. Whitespace-only bodies are kept.
    pub fn inline_scripts(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|script| match script {
            ScriptTag::Inline(body) if !body.is_empty() => Some(body.as_str()),
            _ => None,
        })
    }

    /// Raw `src` values of external scripts.
    pub fn external_scripts(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|script| match script {
            ScriptTag::External(src) => Some(src.as_str()),
            ScriptTag::Inline(_) => None,
        })
    }
}

fn collect_text(root: ElementRef<'_>) -> (String, Vec<String>) {
    let mut visible = Vec::new();
    let mut strings = Vec::new();

    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let text: &str = text;
        strings.push(text.to_string());

        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style"));
        let stripped = text.trim();
        if !hidden && !stripped.is_empty() {
            visible.push(stripped.to_string());
        }
    }

    (visible.join(" "), strings)
}

/// At least one cased character and no lowercase ones.
fn is_uppercase_word(word: &str) -> bool {
    let has_cased = word.chars().any(|c| c.is_uppercase() || c.is_lowercase());
    has_cased && !word.chars().any(char::is_lowercase)
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Page-structure features of a parsed document.
pub fn html_page_features(page: &PageDocument) -> FeatureVector {
    let external_links = page.links.iter().filter(|h| h.starts_with("http")).count();
    let has_https_links = page.links.iter().any(|h| h.starts_with("https://"));

    let remote_scripts = page
        .script_sources
        .iter()
        .filter(|src| !src.starts_with(|c: char| matches!(c, '/' | '.' | '#')))
        .count();

    let link_lengths: Vec<usize> = page
        .links
        .iter()
        .filter(|h| !h.is_empty())
        .map(|h| h.chars().count())
        .collect();
    let avg_link_length = if link_lengths.is_empty() {
        0.0
    } else {
        link_lengths.iter().sum::<usize>() as f64 / link_lengths.len() as f64
    };

    let uppercase_words = page
        .text
        .split_whitespace()
        .filter(|word| word.chars().count() > 1 && is_uppercase_word(word))
        .count();

    let external_css = page
        .stylesheets
        .iter()
        .filter(|href| href.starts_with("http"))
        .count();

    let mut features = FeatureVector::with_capacity(HTML_FEATURE_NAMES.len());
    features.insert("num_links", page.links.len() as f64);
    features.insert("num_forms", page.forms as f64);
    features.insert("num_inputs", page.inputs as f64);
    features.insert("num_scripts", page.scripts.len() as f64);
    features.insert("num_iframes", page.iframes as f64);
    features.insert_flag("has_login", page.strings.iter().any(|s| LOGIN.is_match(s)));
    features.insert("num_meta", page.meta as f64);
    features.insert("text_length", page.text.chars().count() as f64);
    features.insert_flag("has_password_field", page.password_inputs > 0);
    features.insert_flag("has_https_links", has_https_links);
    features.insert(
        "external_script_ratio",
        ratio(remote_scripts, page.script_sources.len()),
    );
    features.insert("external_links_ratio", ratio(external_links, page.links.len()));
    features.insert_flag(
        "has_sensitive_keywords",
        page.strings.iter().any(|s| SENSITIVE.is_match(s)),
    );
    features.insert("num_exclamations", page.text.matches('!').count() as f64);
    features.insert("num_uppercase_words", uppercase_words as f64);
    features.insert("avg_link_length", avg_link_length);
    features.insert("num_divs", page.divs as f64);
    features.insert("num_images", page.images as f64);
    features.insert("num_inline_styles", page.inline_styles as f64);
    features.insert("num_css_files", page.stylesheets.len() as f64);
    features.insert("num_external_css", external_css as f64);
    features
}
