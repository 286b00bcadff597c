//! Merging an issue page back into the production or prepub page it was branched from.
//!
//! Issue pages are found purely by title: `NS:Vissue-<id><sep><title>` belongs
//! to every page ending in `<sep><title>` in the same namespace. The merge base
//! is the issue page's first revision, which by convention is a clone of the
//! page the issue was opened against.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::{PageAddress, Realm, RequestKind, UrlAddress, parse_title, url_form};
use crate::api::{ContentServiceError, PageSelector, PageText, WikiContentService};
use crate::config::{DEFAULT_MIN_SUMMARY_LENGTH, DEFAULT_SEARCH_LIMIT, WikiflowConfig};
use crate::markers::{DEFAULT_BANNER_TEMPLATE, strip_issue_banner};
use crate::merge::{MergeOutcome, merge};
use crate::rewrite::{PrefixRewriter, RewriteError};

/// Result of the edit-summary gate applied before an integrated text is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryCheck {
    Accepted,
    TooShort { min_length: usize },
    MissingIssueId,
}

impl fmt::Display for SummaryCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => f.write_str("summary accepted"),
            Self::TooShort { min_length } => {
                write!(f, "summary is shorter than {min_length} characters")
            }
            Self::MissingIssueId => f.write_str("summary does not start with the issue id"),
        }
    }
}

/// Summaries must reach `min_length` characters and, while an issue is being
/// integrated, start with its id.
pub fn check_summary(summary: &str, issue_id: Option<&str>, min_length: usize) -> SummaryCheck {
    if summary.chars().count() < min_length {
        return SummaryCheck::TooShort { min_length };
    }
    match issue_id {
        Some(id) if !summary.starts_with(id) => SummaryCheck::MissingIssueId,
        _ => SummaryCheck::Accepted,
    }
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error(transparent)]
    Service(#[from] ContentServiceError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error("{0} is an issue page; issues are integrated into production or prepub pages")]
    IssuePage(String),
    #[error("page {0} does not exist; open it as a new page to integrate an issue")]
    MissingTargetPage(String),
    #[error("issue page {0} has no revisions")]
    EmptyHistory(String),
    #[error("no issue selected")]
    NoIssueSelected,
    #[error("edit summary rejected: {0}")]
    SummaryRejected(SummaryCheck),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegratorOptions {
    pub banner_template: String,
    pub search_limit: usize,
    pub min_summary_length: usize,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            banner_template: DEFAULT_BANNER_TEMPLATE.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            min_summary_length: DEFAULT_MIN_SUMMARY_LENGTH,
        }
    }
}

impl IntegratorOptions {
    pub fn from_config(config: &WikiflowConfig) -> Self {
        Self {
            banner_template: config.issue_banner_template(),
            search_limit: config.search_limit(),
            min_summary_length: config.min_summary_length(),
        }
    }
}

/// A completed merge attempt; the integrator holds none until a selection succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeState {
    pub issue_id: String,
    pub issue_title: String,
    pub current_text: Option<String>,
    pub ancestor_text: Option<String>,
    pub incoming_text: String,
    pub outcome: MergeOutcome,
}

impl MergeState {
    pub fn merged_text(&self) -> &str {
        &self.outcome.merged_text
    }

    pub fn has_conflicts(&self) -> bool {
        self.outcome.has_conflicts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedEdit {
    pub title: String,
    pub page_id: i64,
    pub created: bool,
}

pub struct IssueIntegrator<'a, S: WikiContentService + ?Sized> {
    service: &'a S,
    page: UrlAddress,
    current: Option<PageText>,
    options: IntegratorOptions,
    issue_id: Option<String>,
    state: Option<MergeState>,
}

impl<'a, S: WikiContentService + ?Sized> IssueIntegrator<'a, S> {
    /// `current` is the page as it exists now; `None` when the page is being created.
    pub fn new(
        service: &'a S,
        page: UrlAddress,
        current: Option<PageText>,
        options: IntegratorOptions,
    ) -> Result<Self, IntegrationError> {
        if page.address.realm() == Realm::Issue {
            return Err(IntegrationError::IssuePage(page.address.full_title()));
        }
        Ok(Self {
            service,
            page,
            current,
            options,
            issue_id: None,
            state: None,
        })
    }

    /// Fetches the current page text unless the address is a page creation.
    pub fn load(
        service: &'a S,
        page: UrlAddress,
        options: IntegratorOptions,
    ) -> Result<Self, IntegrationError> {
        let current = if page.kind == RequestKind::Create {
            None
        } else {
            let title = page.address.full_title();
            match service.get_page_text(&PageSelector::Title(title.clone())) {
                Ok(text) => Some(text),
                Err(error) if error.is_not_found() => {
                    return Err(IntegrationError::MissingTargetPage(title));
                }
                Err(error) => return Err(error.into()),
            }
        };
        Self::new(service, page, current, options)
    }

    pub fn page(&self) -> &UrlAddress {
        &self.page
    }

    pub fn current_issue_id(&self) -> Option<&str> {
        self.issue_id.as_deref()
    }

    pub fn merge_state(&self) -> Option<&MergeState> {
        self.state.as_ref()
    }

    /// Issue ids whose pages share this page's separator and stem.
    pub fn list_candidate_issues(&self) -> Result<Vec<String>, IntegrationError> {
        let address = &self.page.address;
        let search_prefix = format!("{}Vissue", address.namespace());
        let suffix = address.suffix();
        let hits = self
            .service
            .search_by_prefix(&search_prefix, None, self.options.search_limit)?;

        let mut issue_ids: Vec<String> = Vec::new();
        for hit in hits {
            let title = url_form(&hit.title);
            if !title.ends_with(&suffix) {
                continue;
            }
            let candidate = match parse_title(&title) {
                Ok(candidate) => candidate,
                Err(_) => {
                    debug!(title = %hit.title, "skipping issue page outside the naming convention");
                    continue;
                }
            };
            if !same_stem(&candidate, address) {
                debug!(title = %hit.title, "skipping issue page for another stem");
                continue;
            }
            if let Some(issue_id) = candidate.issue_id()
                && !issue_ids.iter().any(|known| known == issue_id)
            {
                issue_ids.push(issue_id.to_string());
            }
        }
        Ok(issue_ids)
    }

    /// Fetches and merges the given issue. Any previous merge state is discarded
    /// first, so a failed selection leaves nothing selected.
    pub fn select_issue(&mut self, issue_id: &str) -> Result<&MergeState, IntegrationError> {
        self.deselect();

        let issue_address = self.page.address.as_issue(issue_id);
        let issue_title = issue_address.full_title();
        let rewriters = environment_rewriters(
            &issue_address.environment_prefix(),
            &self.page.address.environment_prefix(),
        )?;

        let issue = self
            .service
            .get_page_text(&PageSelector::Title(issue_title.clone()))?;
        let incoming_text = self.prepare(&issue.wikitext, &rewriters);

        let (current_text, ancestor_text) = if self.page.kind == RequestKind::Create {
            (None, None)
        } else {
            let current = self
                .current
                .as_ref()
                .ok_or_else(|| IntegrationError::MissingTargetPage(self.page.address.full_title()))?;
            let history = self.service.get_revision_history(issue.page_id)?;
            let first = history
                .last()
                .ok_or_else(|| IntegrationError::EmptyHistory(issue_title.clone()))?;
            let ancestor = self
                .service
                .get_page_text(&PageSelector::Revision(first.revision_id))?;
            (
                Some(current.wikitext.clone()),
                Some(self.prepare(&ancestor.wikitext, &rewriters)),
            )
        };

        let outcome = merge(
            current_text.as_deref(),
            ancestor_text.as_deref(),
            &incoming_text,
        );
        info!(
            issue = issue_id,
            page = %self.page.address,
            conflicts = outcome.conflicts.len(),
            "merged issue page"
        );

        self.issue_id = Some(issue_id.to_string());
        Ok(&*self.state.insert(MergeState {
            issue_id: issue_id.to_string(),
            issue_title,
            current_text,
            ancestor_text,
            incoming_text,
            outcome,
        }))
    }

    /// Selects the issue named by the URL's `merge_issue` parameter, if any.
    pub fn select_requested_issue(&mut self) -> Result<Option<&MergeState>, IntegrationError> {
        match self.page.merge_issue().map(str::to_string) {
            Some(issue_id) => self.select_issue(&issue_id).map(Some),
            None => Ok(None),
        }
    }

    pub fn deselect(&mut self) {
        self.issue_id = None;
        self.state = None;
    }

    pub fn check_summary(&self, summary: &str) -> SummaryCheck {
        check_summary(summary, self.current_issue_id(), self.options.min_summary_length)
    }

    /// Saves the accepted text to the page, creating it for new pages.
    ///
    /// The summary gate is enforced unless `override_summary_check` is set.
    pub fn apply_merge_result(
        &mut self,
        accepted_text: &str,
        summary: &str,
        override_summary_check: bool,
    ) -> Result<AppliedEdit, IntegrationError> {
        if self.issue_id.is_none() {
            return Err(IntegrationError::NoIssueSelected);
        }
        let check = self.check_summary(summary);
        if check != SummaryCheck::Accepted {
            if !override_summary_check {
                return Err(IntegrationError::SummaryRejected(check));
            }
            warn!(%check, "saving despite rejected summary");
        }

        let title = self.page.address.full_title();
        let applied = match &self.current {
            Some(current) => {
                self.service
                    .write_page_text(current.page_id, accepted_text, summary, false)?;
                AppliedEdit {
                    title,
                    page_id: current.page_id,
                    created: false,
                }
            }
            None => {
                let page_id = self.service.create_page(&title, accepted_text, summary)?;
                AppliedEdit {
                    title,
                    page_id,
                    created: true,
                }
            }
        };
        info!(page = %applied.title, created = applied.created, "saved integrated text");
        Ok(applied)
    }

    fn prepare(&self, text: &str, rewriters: &[PrefixRewriter]) -> String {
        let rewritten = rewriters.iter().fold(
            strip_issue_banner(text, &self.options.banner_template),
            |text, rewriter| rewriter.rewrite(&text),
        );
        if rewriters.iter().any(|rewriter| rewriter.contains_from(&rewritten)) {
            warn!(
                page = %self.page.address,
                "issue references remain in free text after rewriting"
            );
        }
        rewritten
    }
}

/// One rewriter per title separator, so `NS:Vissue-MM-1` never matches inside
/// `NS:Vissue-MM-10_...`.
fn environment_rewriters(from: &str, to: &str) -> Result<Vec<PrefixRewriter>, RewriteError> {
    ['_', '/']
        .into_iter()
        .map(|separator| {
            PrefixRewriter::literal(&format!("{from}{separator}"), &format!("{to}{separator}"))
        })
        .collect()
}

fn same_stem(candidate: &PageAddress, page: &PageAddress) -> bool {
    candidate.namespace_segments() == page.namespace_segments()
        && candidate.separator() == page.separator()
        && candidate.title() == page.title()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse_url;
    use crate::testing::{MockOp, MockWiki};

    const BANNER: &str = "{{IssuePaginaWaarschuwing|MM-1|NS:V1.0_Foo}}\n";

    fn edit_url(title: &str) -> UrlAddress {
        parse_url(
            &format!("https://wiki.example/index.php?title={title}&action=edit"),
            false,
        )
        .expect("edit url")
    }

    fn seeded_wiki() -> MockWiki {
        let wiki = MockWiki::new();
        wiki.add_page(
            "NS:Vprepub-1.0_Foo",
            "Intro edited\nBody\nMiddle\n[[NS:Vprepub-1.0_Other]]",
        );
        let issue = wiki.add_page(
            "NS:Vissue-MM-1_Foo",
            &format!("{BANNER}Intro\nBody\nMiddle\n[[NS:Vprepub-1.0_Other]]"),
        );
        wiki.add_revision(
            issue,
            &format!("{BANNER}Intro\nBody\nMiddle changed\n[[NS:Vissue-MM-1_Other]]"),
        );
        wiki
    }

    #[test]
    fn candidate_issues_match_on_separator_and_stem() {
        let wiki = MockWiki::new();
        wiki.add_page("NS:Vissue-MM-1_Foo", "a");
        wiki.add_page("NS:Vissue-MM-2_Foo", "b");
        wiki.add_page("NS:Vissue-MM-3_Bar", "c");
        wiki.add_page("NS:Vissue-MM-4_Other_Foo", "d");
        wiki.add_page("NS:Vissue-MM-5 Foo", "e");
        wiki.add_page("NS:Vissue-MM-6/Foo", "f");
        wiki.add_page("NS:Vprepub-1.0_Foo", "g");

        let integrator = IssueIntegrator::load(
            &wiki,
            edit_url("NS:Vprepub-1.0_Foo"),
            IntegratorOptions::default(),
        )
        .expect("load");
        let issues = integrator.list_candidate_issues().expect("candidates");
        assert_eq!(issues, vec!["MM-1", "MM-2", "MM-5"]);
    }

    #[test]
    fn select_issue_merges_against_first_revision() {
        let wiki = seeded_wiki();
        let mut integrator = IssueIntegrator::load(
            &wiki,
            edit_url("NS:Vprepub-1.0_Foo"),
            IntegratorOptions::default(),
        )
        .expect("load");

        let state = integrator.select_issue("MM-1").expect("select");
        assert!(!state.has_conflicts());
        assert_eq!(
            state.merged_text(),
            "Intro edited\nBody\nMiddle changed\n[[NS:Vprepub-1.0_Other]]"
        );
        assert_eq!(
            state.ancestor_text.as_deref(),
            Some("Intro\nBody\nMiddle\n[[NS:Vprepub-1.0_Other]]")
        );
        assert!(!state.incoming_text.contains("IssuePaginaWaarschuwing"));
        assert_eq!(integrator.current_issue_id(), Some("MM-1"));
    }

    #[test]
    fn references_to_longer_issue_ids_are_left_alone() {
        let wiki = MockWiki::new();
        wiki.add_page(
            "NS:Vprepub-1.0_Foo",
            "A\n[[NS:Vissue-MM-10_Bar]]\n[[NS:Vprepub-1.0/Sub]]",
        );
        let issue = wiki.add_page(
            "NS:Vissue-MM-1_Foo",
            "A\n[[NS:Vissue-MM-10_Bar]]\n[[NS:Vissue-MM-1/Sub]]",
        );
        wiki.add_revision(
            issue,
            "A2\n[[NS:Vissue-MM-10_Bar]]\n[[NS:Vissue-MM-1/Sub]]",
        );

        let mut integrator = IssueIntegrator::load(
            &wiki,
            edit_url("NS:Vprepub-1.0_Foo"),
            IntegratorOptions::default(),
        )
        .expect("load");
        let state = integrator.select_issue("MM-1").expect("select");
        assert!(!state.has_conflicts());
        assert_eq!(
            state.merged_text(),
            "A2\n[[NS:Vissue-MM-10_Bar]]\n[[NS:Vprepub-1.0/Sub]]"
        );
    }

    #[test]
    fn conflicting_edits_surface_ancestor_paragraph() {
        let wiki = MockWiki::new();
        wiki.add_page("NS:V1.0_Foo", "A\nB2\nC");
        let issue = wiki.add_page("NS:Vissue-MM-9_Foo", "A\nB\nC");
        wiki.add_revision(issue, "A\nB3\nC");

        let mut integrator =
            IssueIntegrator::load(&wiki, edit_url("NS:V1.0_Foo"), IntegratorOptions::default())
                .expect("load");
        let state = integrator.select_issue("MM-9").expect("select");
        assert!(state.has_conflicts());
        assert_eq!(state.merged_text(), "A\nB\nC");
    }

    #[test]
    fn new_pages_take_the_issue_text_verbatim() {
        let wiki = MockWiki::new();
        wiki.add_page(
            "NS:Vissue-MM-7_New",
            &format!("{BANNER}Fresh [[NS:Vissue-MM-7_Link]]\n"),
        );
        let page = parse_url(
            "https://wiki.example/index.php?title=NS:Vprepub-1.0_New&action=edit&merge_issue=MM-7",
            true,
        )
        .expect("url");

        let mut integrator =
            IssueIntegrator::load(&wiki, page, IntegratorOptions::default()).expect("load");
        let state = integrator
            .select_requested_issue()
            .expect("select")
            .expect("requested issue");
        assert_eq!(state.merged_text(), "Fresh [[NS:Vprepub-1.0_Link]]\n");
        assert!(state.current_text.is_none());
        assert!(state.ancestor_text.is_none());

        let merged = state.merged_text().to_string();
        let applied = integrator
            .apply_merge_result(&merged, "MM-7 integrate new page", false)
            .expect("apply");
        assert!(applied.created);
        assert_eq!(
            wiki.text_of("NS:Vprepub-1.0_New").as_deref(),
            Some("Fresh [[NS:Vprepub-1.0_Link]]\n")
        );
    }

    #[test]
    fn failed_selection_clears_previous_state() {
        let wiki = seeded_wiki();
        wiki.add_page("NS:Vissue-MM-2_Foo", "Other issue");
        wiki.fail_on(MockOp::GetText, "NS:Vissue-MM-2_Foo");

        let mut integrator = IssueIntegrator::load(
            &wiki,
            edit_url("NS:Vprepub-1.0_Foo"),
            IntegratorOptions::default(),
        )
        .expect("load");
        integrator.select_issue("MM-1").expect("select first");
        assert!(integrator.merge_state().is_some());

        let error = integrator.select_issue("MM-2").expect_err("must fail");
        assert!(matches!(error, IntegrationError::Service(_)));
        assert!(integrator.merge_state().is_none());
        assert!(integrator.current_issue_id().is_none());
    }

    #[test]
    fn missing_issue_page_is_reported_as_not_found() {
        let wiki = seeded_wiki();
        let mut integrator = IssueIntegrator::load(
            &wiki,
            edit_url("NS:Vprepub-1.0_Foo"),
            IntegratorOptions::default(),
        )
        .expect("load");
        match integrator.select_issue("MM-404") {
            Err(IntegrationError::Service(error)) => assert!(error.is_not_found()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn summary_gate_blocks_unless_overridden() {
        let wiki = seeded_wiki();
        let mut integrator = IssueIntegrator::load(
            &wiki,
            edit_url("NS:Vprepub-1.0_Foo"),
            IntegratorOptions::default(),
        )
        .expect("load");

        assert!(matches!(
            integrator.apply_merge_result("text", "MM-1 fixes", false),
            Err(IntegrationError::NoIssueSelected)
        ));

        let merged = integrator
            .select_issue("MM-1")
            .expect("select")
            .merged_text()
            .to_string();
        assert!(matches!(
            integrator.apply_merge_result(&merged, "short", false),
            Err(IntegrationError::SummaryRejected(SummaryCheck::TooShort { min_length: 10 }))
        ));
        assert!(matches!(
            integrator.apply_merge_result(&merged, "Integrated the lab changes", false),
            Err(IntegrationError::SummaryRejected(SummaryCheck::MissingIssueId))
        ));

        let applied = integrator
            .apply_merge_result(&merged, "short", true)
            .expect("override");
        assert!(!applied.created);
        assert_eq!(wiki.text_of("NS:Vprepub-1.0_Foo").as_deref(), Some(merged.as_str()));
        assert_eq!(
            wiki.last_edit("NS:Vprepub-1.0_Foo"),
            Some(("short".to_string(), false))
        );
    }

    #[test]
    fn issue_pages_cannot_be_integration_targets() {
        let wiki = MockWiki::new();
        let page = UrlAddress::from_title("NS:Vissue-MM-1_Foo", RequestKind::Edit).expect("title");
        assert!(matches!(
            IssueIntegrator::new(&wiki, page, None, IntegratorOptions::default()),
            Err(IntegrationError::IssuePage(_))
        ));
    }

    #[test]
    fn check_summary_rules() {
        assert_eq!(check_summary("MM-1 short", Some("MM-1"), 10), SummaryCheck::Accepted);
        assert_eq!(
            check_summary("MM-1", Some("MM-1"), 10),
            SummaryCheck::TooShort { min_length: 10 }
        );
        assert_eq!(
            check_summary("Fixed the table layout", Some("MM-1"), 10),
            SummaryCheck::MissingIssueId
        );
        assert_eq!(
            check_summary("Fixed the table layout", None, 10),
            SummaryCheck::Accepted
        );
    }
}
