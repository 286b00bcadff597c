//! Scraping helpers for the Duplicator special page, which has no API module.
//!
//! The form token is read from the `<input name="token">` inside the page
//! content. A submission succeeded when the content area shows a result list
//! (`<ul><li>…`) directly after the form; on failure the extension renders a
//! paragraph there instead, whose text is reported back.

use std::collections::BTreeMap;

const CONTENT_MARKER: &str = "mw-content-text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubmissionOutcome {
    Duplicated,
    Rejected(String),
}

pub(crate) fn scrape_form_token(html: &str) -> Option<String> {
    let content = content_area(html);
    scan_tags(content, "input")
        .into_iter()
        .find(|attrs| attrs.get("name").map(String::as_str) == Some("token"))
        .and_then(|attrs| attrs.get("value").map(|value| decode_entities(value)))
        .filter(|value| !value.is_empty())
}

pub(crate) fn submission_outcome(html: &str) -> SubmissionOutcome {
    let content = content_area(html);
    let Some(form_close) = index_of_ignore_case(content, "</form>", 0) else {
        return SubmissionOutcome::Rejected("Duplicator form missing from response".to_string());
    };
    let after_form = content[form_close + "</form>".len()..].trim_start();

    if starts_with_ignore_case(after_form, "<ul") {
        let list_end = index_of_ignore_case(after_form, "</ul>", 0).unwrap_or(after_form.len());
        if index_of_ignore_case(&after_form[..list_end], "<li", 0).is_some() {
            return SubmissionOutcome::Duplicated;
        }
    }

    let message = first_element_text(after_form, "p")
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "no result list after the Duplicator form".to_string());
    SubmissionOutcome::Rejected(message)
}

/// The slice starting at the content container, or the whole document if absent.
fn content_area(html: &str) -> &str {
    match index_of_ignore_case(html, CONTENT_MARKER, 0) {
        Some(index) => &html[index..],
        None => html,
    }
}

fn scan_tags(html: &str, tag_name: &str) -> Vec<BTreeMap<String, String>> {
    let mut tags = Vec::new();
    let mut cursor = 0usize;

    while let Some(offset) = html[cursor..].find('<') {
        let at = cursor + offset;
        if !opens_tag(html, at, tag_name) {
            cursor = at + 1;
            continue;
        }
        let Some(end) = tag_end(html, at) else {
            break;
        };
        tags.push(tag_attributes(&html[at + 1 + tag_name.len()..end]));
        cursor = end + 1;
    }

    tags
}

fn first_element_text(html: &str, tag_name: &str) -> Option<String> {
    let mut cursor = 0usize;
    while let Some(offset) = html[cursor..].find('<') {
        let at = cursor + offset;
        if opens_tag(html, at, tag_name) {
            let open_end = tag_end(html, at)?;
            let close = format!("</{tag_name}>");
            let inner_end = index_of_ignore_case(html, &close, open_end + 1).unwrap_or(html.len());
            return Some(decode_entities(strip_tags(&html[open_end + 1..inner_end]).trim()));
        }
        cursor = at + 1;
    }
    None
}

fn opens_tag(html: &str, at: usize, tag_name: &str) -> bool {
    let rest = &html[at + 1..];
    if !starts_with_ignore_case(rest, tag_name) {
        return false;
    }
    matches!(
        rest.as_bytes().get(tag_name.len()).copied(),
        Some(b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/')
    )
}

fn tag_end(html: &str, start: usize) -> Option<usize> {
    let mut quote = None::<u8>;
    for (index, byte) in html.bytes().enumerate().skip(start) {
        match quote {
            Some(active) if byte == active => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'>' => return Some(index),
            None => {}
        }
    }
    None
}

/// Parses `name="value"` pairs; bare attributes map to an empty value.
fn tag_attributes(raw: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    let mut rest = raw.trim_start_matches(|ch: char| ch.is_ascii_whitespace() || ch == '/');

    while !rest.is_empty() {
        let name_len = rest
            .find(|ch: char| ch.is_ascii_whitespace() || ch == '=' || ch == '/' || ch == '>')
            .unwrap_or(rest.len());
        if name_len == 0 {
            rest = &rest[1..];
            continue;
        }
        let name = rest[..name_len].to_ascii_lowercase();
        rest = rest[name_len..].trim_start();

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let close = body.find(quote).unwrap_or(body.len());
                    value = body[..close].to_string();
                    rest = body.get(close + 1..).unwrap_or("");
                }
                _ => {
                    let end = after_eq
                        .find(|ch: char| ch.is_ascii_whitespace() || ch == '>')
                        .unwrap_or(after_eq.len());
                    value = after_eq[..end].to_string();
                    rest = &after_eq[end..];
                }
            }
        }
        attrs.entry(name).or_insert(value);
        rest = rest.trim_start_matches(|ch: char| ch.is_ascii_whitespace() || ch == '/');
    }

    attrs
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text
}

fn index_of_ignore_case(text: &str, search: &str, start: usize) -> Option<usize> {
    if start > text.len() || search.len() > text.len() - start {
        return None;
    }
    if search.is_empty() {
        return Some(start);
    }
    let needle = search.as_bytes();
    text.as_bytes()[start..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|position| start + position)
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM_PAGE: &str = r#"<html><body>
<div id="searchform"><input name="token" value="wrong"></div>
<div id="mw-content-text" class="mw-body-content">
<form method="post" action="/wiki/Special:Duplicator">
<input type="text" name="source"><input type="text" name="dest">
<input type="hidden" name="token" value="abc123+\">
</form>
</div></body></html>"#;

    #[test]
    fn token_is_read_from_the_content_form() {
        assert_eq!(scrape_form_token(FORM_PAGE).as_deref(), Some("abc123+\\"));
        assert_eq!(scrape_form_token("<div id=\"mw-content-text\"></div>"), None);
    }

    #[test]
    fn result_list_after_form_means_success() {
        let html = r#"<div id="mw-content-text"><form action="x"><input name="token" value="t"></form>
<ul><li>Page <a href="/wiki/NS:V2_Foo">NS:V2_Foo</a> created with 4 revisions.</li></ul></div>"#;
        assert_eq!(submission_outcome(html), SubmissionOutcome::Duplicated);
    }

    #[test]
    fn paragraph_after_form_is_reported_as_rejection() {
        let html = r#"<div id="mw-content-text"><form action="x"></form>
<p>The page <b>NS:V2_Foo</b> already exists.</p></div>"#;
        assert_eq!(
            submission_outcome(html),
            SubmissionOutcome::Rejected("The page NS:V2_Foo already exists.".to_string())
        );
    }

    #[test]
    fn missing_form_is_a_rejection() {
        assert!(matches!(
            submission_outcome("<div id=\"mw-content-text\">Permission error</div>"),
            SubmissionOutcome::Rejected(_)
        ));
    }

    #[test]
    fn attributes_accept_mixed_quoting() {
        let attrs = tag_attributes(r#" type=hidden name='token' value="a b" disabled"#);
        assert_eq!(attrs.get("type").map(String::as_str), Some("hidden"));
        assert_eq!(attrs.get("name").map(String::as_str), Some("token"));
        assert_eq!(attrs.get("value").map(String::as_str), Some("a b"));
        assert_eq!(attrs.get("disabled").map(String::as_str), Some(""));
    }
}
