//! Flattening of line-item descriptions.
//!
//! Descriptions arrive as loose HTML from the quoting platform's editor, or
//! as plain text with dash bullets when typed by hand. Both are reduced to
//! the same shape: paragraphs, bullets, emphasized fragments and the plain
//! text lines in document order.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("Failed to compile tag regex"));

static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|li|div|h[1-6]|ul|ol|tr)\s*>|<(?:li|p|div)(?:\s[^>]*)?>")
        .expect("Failed to compile block break regex")
});

static PARAGRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>").expect("Failed to compile paragraph regex")
});

static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<li(?:\s[^>]*)?>(.*?)</li\s*>").expect("Failed to compile list item regex")
});

static EMPHASIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<em(?:\s[^>]*)?>(.*?)</em\s*>").expect("Failed to compile emphasis regex")
});

static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("Failed to compile entity regex")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

const BULLET_PREFIXES: [char; 3] = ['-', '*', '•'];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markup {
    pub paragraphs: Vec<String>,
    pub bullets: Vec<String>,
    pub emphasis: Vec<String>,
    pub lines: Vec<String>,
}

impl Markup {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// First paragraph, else first line.
    pub fn title(&self) -> Option<&str> {
        self.paragraphs
            .first()
            .or_else(|| self.lines.first())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

pub fn extract(content: &str) -> Markup {
    if TAG.is_match(content) {
        extract_html(content)
    } else {
        extract_plain(content)
    }
}

fn extract_html(content: &str) -> Markup {
    let inner = |re: &Regex| -> Vec<String> {
        re.captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| clean_fragment(m.as_str()))
            .filter(|s| !s.is_empty())
            .collect()
    };

    let broken = BLOCK_BREAK.replace_all(content, "\n");
    let lines = TAG
        .replace_all(&broken, "")
        .lines()
        .map(|line| collapse(&decode_entities(line)))
        .filter(|line| !line.is_empty())
        .collect();

    Markup {
        paragraphs: inner(&*PARAGRAPH),
        bullets: inner(&*LIST_ITEM),
        emphasis: inner(&*EMPHASIS),
        lines,
    }
}

fn extract_plain(content: &str) -> Markup {
    let mut markup = Markup::default();
    for raw in content.lines() {
        let line = collapse(&decode_entities(raw));
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix(&BULLET_PREFIXES[..]) {
            Some(rest) if !rest.trim().is_empty() => markup.bullets.push(rest.trim().to_string()),
            _ => markup.paragraphs.push(line.clone()),
        }
        markup.lines.push(line);
    }
    markup
}

fn clean_fragment(fragment: &str) -> String {
    collapse(&decode_entities(&TAG.replace_all(fragment, " ")))
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let named = text
        .replace("&nbsp;", " ")
        .replace("&euro;", "€")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&eacute;", "é")
        .replace("&euml;", "ë")
        .replace("&egrave;", "è")
        .replace("&times;", "×");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    // last, so "&amp;lt;" stays literal
    numeric.replace("&amp;", "&")
}
