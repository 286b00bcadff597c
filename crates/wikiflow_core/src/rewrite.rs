//! Rewrites environment prefixes inside wiki references.
//!
//! Three reference forms are rewritten, in this order:
//! - wiki links `[[<from>...]]` / `[[<from>...|label]]`
//! - transclusions `{{<from>...}}`, including `{{#lst:...}}`, `{{#lstx:...}}`
//!   and `{{#lsth:...}}` section transclusions
//! - the `link=` parameter of file links (`[[File:...|link=<from>...]]`,
//!   also under the Dutch `Bestand:` alias)
//!
//! Only the prefix itself is replaced; the remainder of every reference is
//! preserved byte for byte.

use regex::{Captures, Regex};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("rewrite source prefix must not be empty")]
    EmptyPrefix,
    #[error("invalid prefix pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A prefix substitution. `from_prefix` is a literal unless `is_regex` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixRule {
    pub from_prefix: String,
    pub to_prefix: String,
    pub is_regex: bool,
}

impl PrefixRule {
    pub fn literal(from_prefix: impl Into<String>, to_prefix: impl Into<String>) -> Self {
        Self {
            from_prefix: from_prefix.into(),
            to_prefix: to_prefix.into(),
            is_regex: false,
        }
    }

    pub fn regex(from_pattern: impl Into<String>, to_prefix: impl Into<String>) -> Self {
        Self {
            from_prefix: from_pattern.into(),
            to_prefix: to_prefix.into(),
            is_regex: true,
        }
    }

    /// Pattern source for the `from` side, with metacharacters escaped for literals.
    pub fn from_pattern(&self) -> String {
        if self.is_regex {
            self.from_prefix.clone()
        } else {
            regex::escape(&self.from_prefix)
        }
    }

    pub fn compile(&self) -> Result<PrefixRewriter, RewriteError> {
        PrefixRewriter::new(self)
    }
}

#[derive(Debug, Clone)]
pub struct PrefixRewriter {
    links: Regex,
    transclusions: Regex,
    file_links: Regex,
    stray: Regex,
    to_prefix: String,
}

impl PrefixRewriter {
    pub fn new(rule: &PrefixRule) -> Result<Self, RewriteError> {
        if rule.from_prefix.is_empty() {
            return Err(RewriteError::EmptyPrefix);
        }
        let from = rule.from_pattern();

        Ok(Self {
            links: compile(&format!(
                r"\[\[(?:{from})(?P<rest>.*?)(?P<close>\]\]|\|)"
            ))?,
            transclusions: compile(&format!(r"\{{\{{(?P<func>#lst[xh]?:)?(?:{from})"))?,
            file_links: compile(&format!(
                r"(?P<head>\[\[(?:File|Bestand|file|bestand):[^\]]*?\|link=)(?:{from})"
            ))?,
            stray: compile(&from)?,
            to_prefix: rule.to_prefix.clone(),
        })
    }

    /// Convenience for the common literal case.
    pub fn literal(from_prefix: &str, to_prefix: &str) -> Result<Self, RewriteError> {
        Self::new(&PrefixRule::literal(from_prefix, to_prefix))
    }

    pub fn rewrite(&self, text: &str) -> String {
        let to = self.to_prefix.as_str();

        let modified = self.links.replace_all(text, |caps: &Captures| {
            format!("[[{to}{}{}", &caps["rest"], &caps["close"])
        });
        let modified = self.transclusions.replace_all(&modified, |caps: &Captures| {
            let func = caps.name("func").map_or("", |value| value.as_str());
            format!("{{{{{func}{to}")
        });
        let modified = self
            .file_links
            .replace_all(&modified, |caps: &Captures| format!("{}{to}", &caps["head"]));

        modified.into_owned()
    }

    /// Whether the source prefix still occurs anywhere in `text`, inside a reference or not.
    pub fn contains_from(&self, text: &str) -> bool {
        self.stray.is_match(text)
    }
}

fn compile(pattern: &str) -> Result<Regex, RewriteError> {
    Regex::new(pattern).map_err(|source| RewriteError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
