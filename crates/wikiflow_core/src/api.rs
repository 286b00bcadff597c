use std::env;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{DEFAULT_USER_AGENT, WikiflowConfig};
use crate::duplicator::{SubmissionOutcome, scrape_form_token, submission_outcome};

const PREFIX_SEARCH_PAGE_SIZE: usize = 500;
const REVISION_PAGE_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum ContentServiceError {
    #[error("page not found: {0}")]
    NotFound(String),
    #[error("page already exists: {0}")]
    AlreadyExists(String),
    #[error("permission denied [{code}]: {info}")]
    PermissionDenied { code: String, info: String },
    #[error("edit conflict: {0}")]
    EditConflict(String),
    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },
    #[error("MediaWiki request failed with HTTP {status}")]
    Http { status: u16 },
    #[error("failed to call MediaWiki: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to decode {context}: {message}")]
    Decode {
        context: &'static str,
        message: String,
    },
    #[error("{0}")]
    Unexpected(String),
}

impl ContentServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Maps a MediaWiki API error code onto the service error taxonomy.
    pub fn from_api_code(code: &str, info: &str) -> Self {
        match code {
            "missingtitle" | "nosuchpageid" | "nosuchrevid" | "missingparam" | "pagecannotexist" => {
                Self::NotFound(info.to_string())
            }
            "articleexists" | "fileexists-no-change" => Self::AlreadyExists(info.to_string()),
            "editconflict" | "pagedeleted" => Self::EditConflict(info.to_string()),
            "permissiondenied" | "protectedpage" | "cascadeprotected" | "protectedtitle"
            | "protectednamespace" | "blocked" | "autoblocked" | "readonly" | "cantcreate"
            | "cantedit" | "cantdelete" | "cantmove" | "notloggedin" | "writeapidenied" => {
                Self::PermissionDenied {
                    code: code.to_string(),
                    info: info.to_string(),
                }
            }
            _ => Self::Api {
                code: code.to_string(),
                info: info.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PageSelector {
    Title(String),
    Revision(i64),
    PageId(i64),
}

impl PageSelector {
    pub fn title(title: impl Into<String>) -> Self {
        Self::Title(title.into())
    }

    fn parse_param(&self) -> (&'static str, String) {
        match self {
            Self::Title(title) => ("page", title.clone()),
            Self::Revision(revision_id) => ("oldid", revision_id.to_string()),
            Self::PageId(page_id) => ("pageid", page_id.to_string()),
        }
    }
}

impl fmt::Display for PageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title(title) => write!(f, "{title}"),
            Self::Revision(revision_id) => write!(f, "revision {revision_id}"),
            Self::PageId(page_id) => write!(f, "page id {page_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    pub title: String,
    pub page_id: i64,
    pub revision_id: i64,
    pub wikitext: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub parent_id: i64,
    pub user: String,
    pub timestamp: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixHit {
    pub title: String,
    pub page_id: i64,
}

/// The wiki operations the workflows depend on.
///
/// Implementations are shared by reference across worker threads.
pub trait WikiContentService: Sync {
    fn get_page_text(&self, selector: &PageSelector) -> Result<PageText, ContentServiceError>;
    /// Newest revision first.
    fn get_revision_history(&self, page_id: i64) -> Result<Vec<RevisionInfo>, ContentServiceError>;
    fn search_by_prefix(
        &self,
        prefix: &str,
        namespace: Option<i32>,
        limit: usize,
    ) -> Result<Vec<PrefixHit>, ContentServiceError>;
    fn write_page_text(
        &self,
        page_id: i64,
        text: &str,
        summary: &str,
        is_minor: bool,
    ) -> Result<(), ContentServiceError>;
    /// Creates a page that must not exist yet and returns its id.
    fn create_page(&self, title: &str, text: &str, summary: &str)
    -> Result<i64, ContentServiceError>;
    /// Deleting a page that no longer exists succeeds.
    fn delete_page(&self, page_id: i64) -> Result<(), ContentServiceError>;
    fn move_page(&self, page_id: i64, new_title: &str) -> Result<(), ContentServiceError>;
    fn duplicate_page_with_history(
        &self,
        title: &str,
        new_title: &str,
    ) -> Result<(), ContentServiceError>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub duplicator_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_env() -> Self {
        Self::from_config(&WikiflowConfig::default())
    }

    pub fn from_config(config: &WikiflowConfig) -> Self {
        let api_url = config.api_url().unwrap_or_default();
        let duplicator_default = config
            .page_url("Special:Duplicator")
            .unwrap_or_default();
        Self {
            api_url,
            duplicator_url: env_value("WIKI_DUPLICATOR_URL", &duplicator_default),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

impl Default for MediaWikiClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            duplicator_url: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: 30_000,
            rate_limit_read_ms: 300,
            rate_limit_write_ms: 1_000,
            max_retries: 2,
            max_write_retries: 1,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Default)]
struct ClientState {
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
    duplicator_token: Option<String>,
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    state: Mutex<ClientState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self, ContentServiceError> {
        if config.api_url.trim().is_empty() {
            return Err(ContentServiceError::Unexpected(
                "wiki API URL is not configured (set WIKI_API_URL or [wiki].api_url)".to_string(),
            ));
        }
        reqwest::Url::parse(&config.api_url).map_err(|error| {
            ContentServiceError::Unexpected(format!(
                "invalid wiki API URL {}: {error}",
                config.api_url
            ))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .map_err(ContentServiceError::Transport)?;

        Ok(Self {
            client,
            config,
            state: Mutex::new(ClientState::default()),
        })
    }

    pub fn config(&self) -> &MediaWikiClientConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_json(
        &self,
        method: Method,
        params: &[(&str, String)],
        is_write: bool,
    ) -> Result<Value, ContentServiceError> {
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }
        debug!(
            action = params
                .iter()
                .find(|(key, _)| *key == "action")
                .map(|(_, value)| value.as_str())
                .unwrap_or(""),
            write = is_write,
            "MediaWiki API request"
        );

        let response = self.send_with_retry(is_write, || match method {
            Method::Get => self.client.get(&self.config.api_url).query(&pairs),
            Method::Post => self.client.post(&self.config.api_url).form(&pairs),
        })?;
        let payload: Value = response.json().map_err(|error| ContentServiceError::Decode {
            context: "MediaWiki API JSON response",
            message: error.to_string(),
        })?;

        if let Some(error) = payload.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown info");
            if code == "badtoken" {
                self.state().csrf_token = None;
            }
            return Err(ContentServiceError::from_api_code(code, info));
        }
        Ok(payload)
    }

    fn request_html(
        &self,
        form: Option<&[(&str, String)]>,
    ) -> Result<String, ContentServiceError> {
        if self.config.duplicator_url.is_empty() {
            return Err(ContentServiceError::Unexpected(
                "Duplicator page URL is not configured (set WIKI_DUPLICATOR_URL or [wiki].url)"
                    .to_string(),
            ));
        }
        let response = self.send_with_retry(form.is_some(), || match form {
            Some(fields) => self.client.post(&self.config.duplicator_url).form(fields),
            None => self.client.get(&self.config.duplicator_url),
        })?;
        response.text().map_err(|error| ContentServiceError::Decode {
            context: "Duplicator page",
            message: error.to_string(),
        })
    }

    fn send_with_retry(
        &self,
        is_write: bool,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, ContentServiceError> {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };

        let mut attempt = 0;
        loop {
            self.apply_rate_limit(is_write);
            let response = build()
                .header("User-Agent", self.config.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt < max_retries && is_retryable_status(status) {
                        self.wait_before_retry(attempt, is_write);
                        attempt += 1;
                        continue;
                    }
                    return Err(ContentServiceError::Http {
                        status: status.as_u16(),
                    });
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, is_write);
                        attempt += 1;
                        continue;
                    }
                    return Err(ContentServiceError::Transport(error));
                }
            }
        }
    }

    /// Requests are serialized through the state lock so the delay holds across threads.
    fn apply_rate_limit(&self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        let mut state = self.state();
        if let Some(last) = state.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        state.last_request_at = Some(Instant::now());
        state.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&self) -> Result<String, ContentServiceError> {
        if let Some(token) = &self.state().csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json(
            Method::Get,
            &[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
            ],
            false,
        )?;
        let parsed: TokenQueryResponse = decode(response, "csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| {
                ContentServiceError::Unexpected("failed to get MediaWiki csrf token".to_string())
            })?;
        self.state().csrf_token = Some(token.clone());
        Ok(token)
    }

    fn ensure_duplicator_token(&self) -> Result<String, ContentServiceError> {
        if let Some(token) = &self.state().duplicator_token {
            return Ok(token.clone());
        }
        let html = self.request_html(None)?;
        let token = scrape_form_token(&html).ok_or_else(|| {
            ContentServiceError::Unexpected(
                "Duplicator form token not found on the special page".to_string(),
            )
        })?;
        self.state().duplicator_token = Some(token.clone());
        Ok(token)
    }
}

impl WikiContentService for MediaWikiClient {
    fn get_page_text(&self, selector: &PageSelector) -> Result<PageText, ContentServiceError> {
        let (key, value) = selector.parse_param();
        let response = self.request_json(
            Method::Get,
            &[
                ("action", "parse".to_string()),
                ("prop", "wikitext|revid".to_string()),
                (key, value),
            ],
            false,
        )?;
        let parsed: ParseResponse = decode(response, "parse API response")?;
        let page = parsed.parse.ok_or_else(|| {
            ContentServiceError::NotFound(format!("no parse output for {selector}"))
        })?;
        match (page.pageid, page.revid, page.wikitext) {
            (Some(page_id), Some(revision_id), Some(wikitext)) => Ok(PageText {
                title: page.title.unwrap_or_else(|| selector.to_string()),
                page_id,
                revision_id,
                wikitext,
            }),
            _ => Err(ContentServiceError::Decode {
                context: "parse API response",
                message: format!("missing wikitext, pageid or revid for {selector}"),
            }),
        }
    }

    fn get_revision_history(&self, page_id: i64) -> Result<Vec<RevisionInfo>, ContentServiceError> {
        let mut revisions = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("prop", "revisions".to_string()),
                ("pageids", page_id.to_string()),
                ("rvprop", "ids|user|timestamp|comment".to_string()),
                ("rvlimit", REVISION_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &continue_token {
                params.push(("rvcontinue", token.clone()));
            }

            let response = self.request_json(Method::Get, &params, false)?;
            let parsed: QueryResponse = decode(response, "revision history response")?;
            let Some(page) = parsed.query.pages.into_iter().next() else {
                return Err(ContentServiceError::NotFound(format!("page id {page_id}")));
            };
            if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
                return Err(ContentServiceError::NotFound(format!("page id {page_id}")));
            }
            for revision in page.revisions {
                revisions.push(RevisionInfo {
                    revision_id: revision.revid,
                    parent_id: revision.parentid.unwrap_or(0),
                    user: revision.user.unwrap_or_default(),
                    timestamp: revision.timestamp.unwrap_or_default(),
                    comment: revision.comment.unwrap_or_default(),
                });
            }

            continue_token = parsed.continuation.and_then(|cont| cont.rvcontinue);
            if continue_token.is_none() {
                break;
            }
        }

        Ok(revisions)
    }

    fn search_by_prefix(
        &self,
        prefix: &str,
        namespace: Option<i32>,
        limit: usize,
    ) -> Result<Vec<PrefixHit>, ContentServiceError> {
        let mut hits = Vec::new();
        let mut offset: Option<i64> = None;

        while hits.len() < limit {
            let page_size = (limit - hits.len()).min(PREFIX_SEARCH_PAGE_SIZE);
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "prefixsearch".to_string()),
                ("pssearch", prefix.to_string()),
                ("pslimit", page_size.to_string()),
                (
                    "psnamespace",
                    namespace.map(|value| value.to_string()).unwrap_or_default(),
                ),
            ];
            if let Some(value) = offset {
                params.push(("psoffset", value.to_string()));
            }

            let response = self.request_json(Method::Get, &params, false)?;
            let parsed: QueryResponse = decode(response, "prefix search response")?;
            for item in parsed.query.prefixsearch {
                hits.push(PrefixHit {
                    title: item.title,
                    page_id: item.pageid,
                });
            }

            offset = parsed.continuation.and_then(|cont| cont.psoffset);
            if offset.is_none() {
                break;
            }
        }

        hits.truncate(limit);
        Ok(hits)
    }

    fn write_page_text(
        &self,
        page_id: i64,
        text: &str,
        summary: &str,
        is_minor: bool,
    ) -> Result<(), ContentServiceError> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json(
            Method::Post,
            &[
                ("action", "edit".to_string()),
                ("pageid", page_id.to_string()),
                ("text", text.to_string()),
                ("summary", summary.to_string()),
                ("minor", flag(is_minor)),
                ("nocreate", flag(true)),
                ("token", token),
            ],
            true,
        )?;
        let parsed: EditResponse = decode(response, "edit response")?;
        expect_edit_success(parsed, &format!("page id {page_id}")).map(|_| ())
    }

    fn create_page(
        &self,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<i64, ContentServiceError> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json(
            Method::Post,
            &[
                ("action", "edit".to_string()),
                ("title", title.to_string()),
                ("text", text.to_string()),
                ("summary", summary.to_string()),
                ("createonly", flag(true)),
                ("token", token),
            ],
            true,
        )?;
        let parsed: EditResponse = decode(response, "edit response")?;
        let edit = expect_edit_success(parsed, title)?;
        edit.pageid.ok_or_else(|| ContentServiceError::Decode {
            context: "edit response",
            message: format!("created page {title} has no page id"),
        })
    }

    fn delete_page(&self, page_id: i64) -> Result<(), ContentServiceError> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json(
            Method::Post,
            &[
                ("action", "delete".to_string()),
                ("pageid", page_id.to_string()),
                ("token", token),
            ],
            true,
        );

        match response {
            Ok(payload) if payload.get("delete").is_some() => Ok(()),
            Ok(payload) => Err(ContentServiceError::Unexpected(format!(
                "failed to delete page id {page_id}: {payload}"
            ))),
            Err(error) if error.is_not_found() => {
                debug!(page_id, "page already gone, nothing to delete");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn move_page(&self, page_id: i64, new_title: &str) -> Result<(), ContentServiceError> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json(
            Method::Post,
            &[
                ("action", "move".to_string()),
                ("fromid", page_id.to_string()),
                ("to", new_title.to_string()),
                ("noredirect", flag(true)),
                ("token", token),
            ],
            true,
        )?;
        if response.get("move").is_some() {
            Ok(())
        } else {
            Err(ContentServiceError::Unexpected(format!(
                "failed to move page id {page_id} to {new_title}: {response}"
            )))
        }
    }

    fn duplicate_page_with_history(
        &self,
        title: &str,
        new_title: &str,
    ) -> Result<(), ContentServiceError> {
        let token = self.ensure_duplicator_token()?;
        let form = [
            ("source", title.to_string()),
            ("dest", new_title.to_string()),
            ("history", "1".to_string()),
            ("token", token),
        ];
        let html = self.request_html(Some(&form))?;
        match submission_outcome(&html) {
            SubmissionOutcome::Duplicated => Ok(()),
            SubmissionOutcome::Rejected(message) => Err(ContentServiceError::Unexpected(
                format!("Duplicator refused {title} -> {new_title}: {message}"),
            )),
        }
    }

    fn request_count(&self) -> usize {
        self.state().request_count
    }
}

fn decode<T: for<'de> Deserialize<'de>>(
    value: Value,
    context: &'static str,
) -> Result<T, ContentServiceError> {
    serde_json::from_value(value).map_err(|error| ContentServiceError::Decode {
        context,
        message: error.to_string(),
    })
}

fn expect_edit_success(
    response: EditResponse,
    target: &str,
) -> Result<EditPayload, ContentServiceError> {
    let edit = response.edit.ok_or_else(|| ContentServiceError::Decode {
        context: "edit response",
        message: "missing edit payload".to_string(),
    })?;
    if edit.result.as_deref() != Some("Success") {
        return Err(ContentServiceError::Unexpected(format!(
            "MediaWiki edit failed for {target}: {}",
            edit.result.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(edit)
}

/// Boolean API flags are sent as `1`; empty values are dropped from the request.
fn flag(enabled: bool) -> String {
    if enabled {
        "1".to_string()
    } else {
        String::new()
    }
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct ParseResponse {
    parse: Option<ParsePayload>,
}

#[derive(Debug, Deserialize, Default)]
struct ParsePayload {
    title: Option<String>,
    pageid: Option<i64>,
    revid: Option<i64>,
    wikitext: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
    #[serde(default)]
    prefixsearch: Vec<PrefixSearchItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    rvcontinue: Option<String>,
    psoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: i64,
    parentid: Option<i64>,
    user: Option<String>,
    timestamp: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrefixSearchItem {
    title: String,
    pageid: i64,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
    pageid: Option<i64>,
}
