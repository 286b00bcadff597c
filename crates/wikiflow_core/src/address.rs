use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use serde::Serialize;

pub const ISSUE_MARKER: &str = "issue-";
pub const PREPUB_MARKER: &str = "prepub-";

/// The environment a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    Production,
    Prepub,
    Issue,
}

impl Realm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Prepub => "prepub",
            Self::Issue => "issue",
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Production => "",
            Self::Prepub => PREPUB_MARKER,
            Self::Issue => ISSUE_MARKER,
        }
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a title does not follow the `[NS:]V[marker]<token><sep><title>` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("title does not follow the environment naming convention")]
pub struct AddressParseFailure;

/// A page title split into its environment parts.
///
/// The realm token is stored once: it is the version for production and
/// prepub pages and the issue id for issue pages, so both can never be set at
/// the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageAddress {
    namespace: Vec<String>,
    realm: Realm,
    token: String,
    separator: char,
    title: String,
}

impl PageAddress {
    pub fn realm(&self) -> Realm {
        self.realm
    }

    /// Namespace segments without their trailing colons, outermost first.
    pub fn namespace_segments(&self) -> &[String] {
        &self.namespace
    }

    /// Full namespace including every trailing colon, e.g. `MedMij:Sub:`; empty when absent.
    pub fn namespace(&self) -> String {
        self.namespace
            .iter()
            .map(|segment| format!("{segment}:"))
            .collect()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn version(&self) -> Option<&str> {
        match self.realm {
            Realm::Production | Realm::Prepub => Some(&self.token),
            Realm::Issue => None,
        }
    }

    pub fn issue_id(&self) -> Option<&str> {
        match self.realm {
            Realm::Issue => Some(&self.token),
            Realm::Production | Realm::Prepub => None,
        }
    }

    /// Environment prefix without separator, e.g. `MedMij:Vprepub-2020.01`.
    pub fn environment_prefix(&self) -> String {
        format!("{}V{}{}", self.namespace(), self.realm.marker(), self.token)
    }

    /// Environment prefix including the separator, e.g. `MedMij:Vprepub-2020.01/`.
    pub fn page_prefix(&self) -> String {
        format!("{}{}", self.environment_prefix(), self.separator)
    }

    /// The canonical title in URL form.
    pub fn full_title(&self) -> String {
        format!("{}{}", self.page_prefix(), self.title)
    }

    /// The separator plus stem every environment copy of this page ends with.
    pub fn suffix(&self) -> String {
        format!("{}{}", self.separator, self.title)
    }

    /// The same page stem in another environment.
    pub fn in_realm(&self, realm: Realm, token: &str) -> Self {
        Self {
            namespace: self.namespace.clone(),
            realm,
            token: token.to_string(),
            separator: self.separator,
            title: self.title.clone(),
        }
    }

    pub fn as_issue(&self, issue_id: &str) -> Self {
        self.in_realm(Realm::Issue, issue_id)
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_title())
    }
}

/// Normalize a wiki title to URL form (underscores instead of spaces).
pub fn url_form(title: &str) -> String {
    title.replace(' ', "_")
}

pub fn parse_title(raw_title: &str) -> Result<PageAddress, AddressParseFailure> {
    let title = url_form(raw_title);

    // Namespace segments are alphabetic runs terminated by ':'. Prefer the
    // longest namespace that still leaves a parseable remainder.
    let mut boundaries = vec![0usize];
    let mut cursor = 0usize;
    while let Some(length) = namespace_segment_len(&title[cursor..]) {
        cursor += length + 1;
        boundaries.push(cursor);
    }

    for boundary in boundaries.into_iter().rev() {
        if let Some((realm, token, separator, stem)) = parse_environment(&title[boundary..]) {
            let namespace = title[..boundary]
                .split(':')
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
                .collect();
            return Ok(PageAddress {
                namespace,
                realm,
                token: token.to_string(),
                separator,
                title: stem.to_string(),
            });
        }
    }

    Err(AddressParseFailure)
}

fn namespace_segment_len(value: &str) -> Option<usize> {
    let length = value
        .bytes()
        .take_while(|byte| byte.is_ascii_alphabetic())
        .count();
    if length > 0 && value.as_bytes().get(length) == Some(&b':') {
        Some(length)
    } else {
        None
    }
}

fn parse_environment(value: &str) -> Option<(Realm, &str, char, &str)> {
    let rest = value.strip_prefix('V')?;
    let (realm, rest) = if let Some(rest) = rest.strip_prefix(ISSUE_MARKER) {
        (Realm::Issue, rest)
    } else if let Some(rest) = rest.strip_prefix(PREPUB_MARKER) {
        (Realm::Prepub, rest)
    } else {
        (Realm::Production, rest)
    };

    let split = rest.find(['_', '/'])?;
    let token = &rest[..split];
    let separator = rest[split..].chars().next()?;
    let stem = &rest[split + 1..];
    if token.is_empty() || stem.is_empty() {
        return None;
    }
    Some((realm, token, separator, stem))
}

/// What kind of wiki request a URL represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Read,
    Create,
    Edit,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Edit => "edit",
        }
    }
}

/// A page address derived from a wiki URL, plus the request kind and query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlAddress {
    pub address: PageAddress,
    pub kind: RequestKind,
    pub params: BTreeMap<String, String>,
}

impl UrlAddress {
    /// Wrap a plain title; the kind is supplied by the caller.
    pub fn from_title(raw_title: &str, kind: RequestKind) -> Result<Self, AddressParseFailure> {
        Ok(Self {
            address: parse_title(raw_title)?,
            kind,
            params: BTreeMap::new(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Issue id requested through the `merge_issue` parameter.
    pub fn merge_issue(&self) -> Option<&str> {
        self.param("merge_issue")
    }

    /// Production version a new issue page should be branched from.
    pub fn source(&self) -> Option<&str> {
        self.param("source")
    }

    pub fn clone_requested(&self) -> bool {
        self.param("clone") != Some("false")
    }

    pub fn issue_url(&self) -> Option<&str> {
        self.param("issue_url")
    }
}

/// Classify a wiki URL.
///
/// `/index.php?title=...&action=edit` is an edit, or a create when the caller
/// reports the page as new; `/wiki/<title>` is a read. Anything else fails.
pub fn parse_url(url: &str, is_new_page: bool) -> Result<UrlAddress, AddressParseFailure> {
    let parsed = Url::parse(url).map_err(|_| AddressParseFailure)?;
    let path = parsed.path();

    if path == "/index.php" || path.ends_with("/index.php") {
        let params = parsed
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect::<BTreeMap<_, _>>();
        if params.get("action").map(String::as_str) != Some("edit") {
            return Err(AddressParseFailure);
        }
        let title = params.get("title").ok_or(AddressParseFailure)?;
        let address = parse_title(title)?;
        let kind = if is_new_page {
            RequestKind::Create
        } else {
            RequestKind::Edit
        };
        return Ok(UrlAddress {
            address,
            kind,
            params,
        });
    }

    if let Some(rest) = path.strip_prefix("/wiki/") {
        let address = parse_title(&percent_decode(rest))?;
        return Ok(UrlAddress {
            address,
            kind: RequestKind::Read,
            params: BTreeMap::new(),
        });
    }

    Err(AddressParseFailure)
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0usize;
    while index < bytes.len() {
        if bytes[index] == b'%'
            && index + 2 < bytes.len()
            && let (Some(high), Some(low)) =
                (hex_value(bytes[index + 1]), hex_value(bytes[index + 2]))
        {
            out.push(high * 16 + low);
            index += 3;
            continue;
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
