//! Page-level markers: the `__NOINDEX__` magic word and the issue banner template.

use regex::Regex;
use serde::Serialize;

pub const NOINDEX: &str = "__NOINDEX__";
pub const DEFAULT_BANNER_TEMPLATE: &str = "IssuePaginaWaarschuwing";

/// What to do with `__NOINDEX__` when a page lands in a new environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingPolicy {
    Keep,
    Allow,
    Forbid,
}

impl IndexingPolicy {
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Keep => text.to_string(),
            Self::Allow => remove_noindex(text),
            Self::Forbid => ensure_noindex(text),
        }
    }
}

pub fn has_noindex(text: &str) -> bool {
    text.contains(NOINDEX)
}

pub fn ensure_noindex(text: &str) -> String {
    if has_noindex(text) {
        text.to_string()
    } else {
        format!("{NOINDEX}\n{text}")
    }
}

/// Drops lines holding only the marker, then any inline occurrence.
pub fn remove_noindex(text: &str) -> String {
    if !has_noindex(text) {
        return text.to_string();
    }
    let kept = text
        .split_inclusive('\n')
        .filter(|line| !(line.ends_with('\n') && line.trim() == NOINDEX))
        .collect::<String>();
    kept.replace(NOINDEX, "")
}

/// `{{<template>|<issue>|<source title>[|url=<url>]}}` followed by a newline.
pub fn issue_banner(
    template: &str,
    issue_id: &str,
    source_title: &str,
    issue_url: Option<&str>,
) -> String {
    match issue_url {
        Some(url) if !url.is_empty() => {
            format!("{{{{{template}|{issue_id}|{source_title}|url={url}}}}}\n")
        }
        _ => format!("{{{{{template}|{issue_id}|{source_title}}}}}\n"),
    }
}

/// Removes the first issue banner and the whitespace run that ends it.
pub fn strip_issue_banner(text: &str, template: &str) -> String {
    let pattern = format!(r"\{{\{{{}\|.*?\}}\}}(?:\s*\n)?", regex::escape(template));
    match Regex::new(&pattern) {
        Ok(banner) => banner.replacen(text, 1, "").into_owned(),
        Err(_) => text.to_string(),
    }
}
