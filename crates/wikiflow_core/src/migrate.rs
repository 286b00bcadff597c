//! Bulk environment operations: publish a prepub environment, create a prepub
//! copy of production, duplicate an arbitrary prefix, or delete one.
//!
//! Pages are paired by the part of their title after the environment prefix.
//! Every pair then runs its own chain of steps on a worker; a failed step stops
//! that pair only and is recorded on it.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::{PREPUB_MARKER, url_form};
use crate::api::{ContentServiceError, PageSelector, PrefixHit, WikiContentService};
use crate::markers::IndexingPolicy;
use crate::rewrite::{PrefixRewriter, RewriteError};

const PUBLISH_SUMMARY: &str = "Publish prepub to live environment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationAction {
    Publish,
    CreatePrepub,
    Duplicate,
    Delete,
}

impl MigrationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::CreatePrepub => "create_prepub",
            Self::Duplicate => "duplicate",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixValidationError {
    #[error("source prefix is empty")]
    EmptySource,
    #[error("a target prefix is required for {0}")]
    MissingTarget(MigrationAction),
    #[error("`{0}` is not a valid environment prefix")]
    InvalidShape(String),
    #[error("`{0}` is not a prepub environment prefix")]
    NotPrepub(String),
    #[error("`{0}` is already a prepub environment prefix")]
    AlreadyPrepub(String),
}

/// `[NS:]V[prepub-]<version>[sep]`, split into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EnvironmentPrefix<'a> {
    namespace: &'a str,
    prepub: bool,
    version: &'a str,
    separator: &'a str,
}

fn parse_environment_prefix(prefix: &str) -> Option<EnvironmentPrefix<'_>> {
    let (body, separator) = match prefix.char_indices().last() {
        Some((at, '_' | '/')) => (&prefix[..at], &prefix[at..]),
        _ => (prefix, ""),
    };

    let mut namespace_end = 0usize;
    loop {
        let rest = &body[namespace_end..];
        let letters = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
        if letters > 0 && rest.as_bytes().get(letters) == Some(&b':') {
            namespace_end += letters + 1;
        } else {
            break;
        }
    }

    let rest = body[namespace_end..].strip_prefix('V')?;
    let (prepub, version) = match rest.strip_prefix(PREPUB_MARKER) {
        Some(version) => (true, version),
        None => (false, rest),
    };
    let valid_version = !version.is_empty()
        && version
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '.');
    valid_version.then_some(EnvironmentPrefix {
        namespace: &body[..namespace_end],
        prepub,
        version,
        separator,
    })
}

/// A validated migration: what to do and between which prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    action: MigrationAction,
    source_prefix: String,
    target_prefix: Option<String>,
}

impl MigrationPlan {
    /// Checks the prefixes for `action` before anything touches the wiki.
    ///
    /// Publish and create_prepub derive the target from the source; duplicate
    /// takes both as given; delete ignores any target.
    pub fn new(
        action: MigrationAction,
        source_prefix: &str,
        target_prefix: Option<&str>,
    ) -> Result<Self, PrefixValidationError> {
        let source_prefix = url_form(source_prefix.trim());
        if source_prefix.is_empty() {
            return Err(PrefixValidationError::EmptySource);
        }

        let target_prefix = match action {
            MigrationAction::Delete => None,
            MigrationAction::Duplicate => {
                let target = target_prefix
                    .map(|value| url_form(value.trim()))
                    .filter(|value| !value.is_empty())
                    .ok_or(PrefixValidationError::MissingTarget(action))?;
                Some(target)
            }
            MigrationAction::Publish | MigrationAction::CreatePrepub => {
                let parts = parse_environment_prefix(&source_prefix)
                    .ok_or_else(|| PrefixValidationError::InvalidShape(source_prefix.clone()))?;
                let marker = match (action, parts.prepub) {
                    (MigrationAction::Publish, true) => "",
                    (MigrationAction::Publish, false) => {
                        return Err(PrefixValidationError::NotPrepub(source_prefix));
                    }
                    (_, true) => {
                        return Err(PrefixValidationError::AlreadyPrepub(source_prefix));
                    }
                    (_, false) => PREPUB_MARKER,
                };
                Some(format!(
                    "{}V{marker}{}{}",
                    parts.namespace, parts.version, parts.separator
                ))
            }
        };

        Ok(Self {
            action,
            source_prefix,
            target_prefix,
        })
    }

    pub fn action(&self) -> MigrationAction {
        self.action
    }

    pub fn source_prefix(&self) -> &str {
        &self.source_prefix
    }

    pub fn target_prefix(&self) -> Option<&str> {
        self.target_prefix.as_deref()
    }

    /// Edit summary for the rewrite step; delete writes nothing.
    pub fn summary(&self) -> Option<String> {
        let target = self.target_prefix.as_deref()?;
        Some(match self.action {
            MigrationAction::Publish => PUBLISH_SUMMARY.to_string(),
            MigrationAction::CreatePrepub => {
                format!("Create prepub environment from {}", self.source_prefix)
            }
            MigrationAction::Duplicate => {
                format!("Duplicate {} environment to {target}", self.source_prefix)
            }
            MigrationAction::Delete => return None,
        })
    }

    pub fn indexing(&self) -> IndexingPolicy {
        match self.action {
            MigrationAction::Publish => IndexingPolicy::Allow,
            MigrationAction::CreatePrepub => IndexingPolicy::Forbid,
            MigrationAction::Duplicate | MigrationAction::Delete => IndexingPolicy::Keep,
        }
    }

    fn rewriter(&self) -> Result<Option<PrefixRewriter>, RewriteError> {
        self.target_prefix
            .as_deref()
            .map(|target| PrefixRewriter::literal(&self.source_prefix, target))
            .transpose()
    }
}

/// A page title and, when the page exists, its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub title: String,
    pub id: Option<i64>,
}

impl PageRef {
    pub fn existing(title: impl Into<String>, id: i64) -> Self {
        Self {
            title: title.into(),
            id: Some(id),
        }
    }

    pub fn planned(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    DeleteTarget,
    DuplicateSource,
    FetchTarget,
    RewriteTarget,
    DeleteSource,
}

impl MigrationStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeleteTarget => "delete target",
            Self::DuplicateSource => "duplicate source",
            Self::FetchTarget => "fetch target",
            Self::RewriteTarget => "rewrite target",
            Self::DeleteSource => "delete source",
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: MigrationStep,
    pub message: String,
}

impl StepFailure {
    fn new(step: MigrationStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

/// A source page and its counterpart in the target environment, plus the
/// progress of the migration steps run on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagePair {
    pub source: Option<PageRef>,
    pub target: Option<PageRef>,
    pub source_deleted: bool,
    pub target_deleted: bool,
    pub source_duplicated: bool,
    pub target_rewritten: bool,
    pub contains_leftover_prefix: bool,
    pub failure: Option<StepFailure>,
}

impl PagePair {
    /// Returns `None` unless at least one side is an existing page.
    pub fn new(source: Option<PageRef>, target: Option<PageRef>) -> Option<Self> {
        let has_page = source.as_ref().is_some_and(|page| page.id.is_some())
            || target.as_ref().is_some_and(|page| page.id.is_some());
        has_page.then_some(Self {
            source,
            target,
            source_deleted: false,
            target_deleted: false,
            source_duplicated: false,
            target_rewritten: false,
            contains_leftover_prefix: false,
            failure: None,
        })
    }

    pub fn source_title(&self) -> Option<&str> {
        self.source.as_ref().map(|page| page.title.as_str())
    }

    pub fn target_title(&self) -> Option<&str> {
        self.target.as_ref().map(|page| page.title.as_str())
    }

    /// A target page that exists without a source page.
    pub fn is_orphan(&self) -> bool {
        self.source.is_none()
    }

    pub fn target_exists(&self) -> bool {
        self.target.as_ref().is_some_and(|page| page.id.is_some())
    }

    pub fn involves(&self, title: &str) -> bool {
        let title = url_form(title);
        self.source_title() == Some(title.as_str()) || self.target_title() == Some(title.as_str())
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Short description of what the action will do to this pair.
    pub fn describe(&self, action: MigrationAction) -> String {
        let source = self.source_title().unwrap_or_default();
        let target = self.target_title().unwrap_or_default();
        match action {
            MigrationAction::Delete => format!("{source} will be deleted"),
            _ if self.is_orphan() => format!("{target} will be deleted (no source page)"),
            MigrationAction::Publish if self.target_exists() => format!("{source} replaces {target}"),
            MigrationAction::Publish => format!("{source} will be published as {target}"),
            _ if self.target_exists() => format!("{source} cannot be copied, {target} exists"),
            _ => format!("{source} will be duplicated as {target}"),
        }
    }
}

/// Searches the source (and target) environment and pairs pages by suffix.
///
/// Matched pages form one pair; source pages without a counterpart get a
/// planned target; target pages without a source come last as orphans.
pub fn collect_pairs<S: WikiContentService + ?Sized>(
    service: &S,
    plan: &MigrationPlan,
    limit: usize,
) -> Result<Vec<PagePair>, ContentServiceError> {
    let (source_hits, target_hits) = thread::scope(|scope| {
        let source_handle = scope.spawn(|| service.search_by_prefix(plan.source_prefix(), None, limit));
        let target_handle = plan
            .target_prefix()
            .map(|prefix| scope.spawn(move || service.search_by_prefix(prefix, None, limit)));

        let source_hits = source_handle.join().map_err(|_| {
            ContentServiceError::Unexpected("source search thread panicked".to_string())
        })??;
        let target_hits = match target_handle {
            Some(handle) => handle.join().map_err(|_| {
                ContentServiceError::Unexpected("target search thread panicked".to_string())
            })??,
            None => Vec::new(),
        };
        Ok::<_, ContentServiceError>((source_hits, target_hits))
    })?;

    let sources = pages_by_suffix(source_hits, plan.source_prefix());
    let mut targets = match plan.target_prefix() {
        Some(prefix) => pages_by_suffix(target_hits, prefix),
        None => BTreeMap::new(),
    };

    let mut pairs = Vec::with_capacity(sources.len() + targets.len());
    for (suffix, source) in sources {
        let target = plan.target_prefix().map(|prefix| {
            targets
                .remove(&suffix)
                .unwrap_or_else(|| PageRef::planned(format!("{prefix}{suffix}")))
        });
        pairs.extend(PagePair::new(Some(source), target));
    }
    for target in targets.into_values() {
        pairs.extend(PagePair::new(None, Some(target)));
    }

    info!(
        action = %plan.action(),
        source = plan.source_prefix(),
        pairs = pairs.len(),
        "collected page pairs"
    );
    Ok(pairs)
}

fn pages_by_suffix(hits: Vec<PrefixHit>, prefix: &str) -> BTreeMap<String, PageRef> {
    let mut pages = BTreeMap::new();
    for hit in hits {
        let title = url_form(&hit.title);
        let Some(suffix) = title.strip_prefix(prefix) else {
            debug!(title = %title, prefix, "search hit does not carry the prefix");
            continue;
        };
        pages.insert(suffix.to_string(), PageRef::existing(title.clone(), hit.page_id));
    }
    pages
}

/// Selects the pairs not touching any of the excluded titles.
pub fn active_flags(pairs: &[PagePair], exclude: &[String]) -> Vec<bool> {
    pairs
        .iter()
        .map(|pair| !exclude.iter().any(|title| pair.involves(title)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Runs the plan's action on every active pair.
///
/// Pairs are spread over at most `max_parallel` workers. `on_finished` is
/// called on the calling thread with the pair's index as soon as its chain has
/// completed or failed; `pairs` holds the final state afterwards.
pub fn perform_action<S, F>(
    service: &S,
    plan: &MigrationPlan,
    pairs: &mut [PagePair],
    active: &[bool],
    max_parallel: usize,
    mut on_finished: F,
) -> Result<MigrationSummary, RewriteError>
where
    S: WikiContentService + ?Sized,
    F: FnMut(usize, &PagePair),
{
    let rewriter = plan.rewriter()?;
    let summary_text = plan.summary().unwrap_or_default();

    let queue = pairs
        .iter()
        .enumerate()
        .filter(|(index, _)| active.get(*index).copied().unwrap_or(false))
        .map(|(index, pair)| (index, pair.clone()))
        .collect::<VecDeque<_>>();
    let mut summary = MigrationSummary {
        skipped: pairs.len() - queue.len(),
        ..MigrationSummary::default()
    };
    let workers = max_parallel.max(1).min(queue.len());
    let queue = Mutex::new(queue);

    let context = StepContext {
        plan,
        rewriter: rewriter.as_ref(),
        summary: &summary_text,
    };

    thread::scope(|scope| {
        let (sender, receiver) = mpsc::channel::<(usize, PagePair)>();
        for _ in 0..workers {
            let sender = sender.clone();
            let queue = &queue;
            let context = &context;
            scope.spawn(move || {
                loop {
                    let next = queue.lock().ok().and_then(|mut queue| queue.pop_front());
                    let Some((index, mut pair)) = next else {
                        break;
                    };
                    context.run(service, &mut pair);
                    if sender.send((index, pair)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(sender);

        for (index, pair) in receiver {
            if pair.succeeded() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            on_finished(index, &pair);
            pairs[index] = pair;
        }
    });

    info!(
        action = %plan.action(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "migration finished"
    );
    Ok(summary)
}

struct StepContext<'a> {
    plan: &'a MigrationPlan,
    rewriter: Option<&'a PrefixRewriter>,
    summary: &'a str,
}

impl StepContext<'_> {
    fn run<S: WikiContentService + ?Sized>(&self, service: &S, pair: &mut PagePair) {
        let outcome = match self.plan.action() {
            MigrationAction::Publish => self.publish(service, pair),
            MigrationAction::CreatePrepub | MigrationAction::Duplicate => {
                self.copy_to_target(service, pair)
            }
            MigrationAction::Delete => delete_source(service, pair),
        };
        if let Err(failure) = outcome {
            warn!(
                action = %self.plan.action(),
                source = pair.source_title().unwrap_or_default(),
                target = pair.target_title().unwrap_or_default(),
                step = %failure.step,
                error = %failure.message,
                "migration step failed"
            );
            pair.failure = Some(failure);
        }
    }

    fn publish<S: WikiContentService + ?Sized>(
        &self,
        service: &S,
        pair: &mut PagePair,
    ) -> Result<(), StepFailure> {
        if let Some(target_id) = pair.target.as_ref().and_then(|target| target.id) {
            service
                .delete_page(target_id)
                .map_err(|error| step_error(MigrationStep::DeleteTarget, error))?;
            pair.target_deleted = true;
            if let Some(target) = pair.target.as_mut() {
                target.id = None;
            }
            info!(page = pair.target_title().unwrap_or_default(), "deleted target page");
        }
        if pair.is_orphan() {
            return Ok(());
        }
        self.copy_to_target(service, pair)
    }

    fn copy_to_target<S: WikiContentService + ?Sized>(
        &self,
        service: &S,
        pair: &mut PagePair,
    ) -> Result<(), StepFailure> {
        let (Some(source), Some(target)) = (pair.source.clone(), pair.target.clone()) else {
            return Err(StepFailure::new(
                MigrationStep::DuplicateSource,
                "target page already exists without a source page",
            ));
        };
        if target.id.is_some() {
            return Err(StepFailure::new(
                MigrationStep::DuplicateSource,
                "target page already exists",
            ));
        }

        service
            .duplicate_page_with_history(&source.title, &target.title)
            .map_err(|error| step_error(MigrationStep::DuplicateSource, error))?;
        pair.source_duplicated = true;
        info!(source = %source.title, target = %target.title, "duplicated page");

        let copied = service
            .get_page_text(&PageSelector::Title(target.title.clone()))
            .map_err(|error| step_error(MigrationStep::FetchTarget, error))?;
        if let Some(target) = pair.target.as_mut() {
            target.id = Some(copied.page_id);
        }

        let Some(rewriter) = self.rewriter else {
            return Ok(());
        };
        let text = self.plan.indexing().apply(&rewriter.rewrite(&copied.wikitext));
        service
            .write_page_text(copied.page_id, &text, self.summary, true)
            .map_err(|error| step_error(MigrationStep::RewriteTarget, error))?;
        pair.target_rewritten = true;
        pair.contains_leftover_prefix = rewriter.contains_from(&text);
        if pair.contains_leftover_prefix {
            warn!(
                page = %target.title,
                prefix = self.plan.source_prefix(),
                "rewritten page still mentions the source prefix"
            );
        }
        Ok(())
    }
}

fn delete_source<S: WikiContentService + ?Sized>(
    service: &S,
    pair: &mut PagePair,
) -> Result<(), StepFailure> {
    let Some(source_id) = pair.source.as_ref().and_then(|source| source.id) else {
        return Ok(());
    };
    service
        .delete_page(source_id)
        .map_err(|error| step_error(MigrationStep::DeleteSource, error))?;
    pair.source_deleted = true;
    info!(page = pair.source_title().unwrap_or_default(), "deleted page");
    Ok(())
}

fn step_error(step: MigrationStep, error: ContentServiceError) -> StepFailure {
    StepFailure::new(step, error.to_string())
}
