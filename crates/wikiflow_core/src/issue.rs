//! Opening issue pages from production pages, and finding where an issue can be integrated.

use std::collections::BTreeMap;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::address::{PageAddress, Realm, UrlAddress, parse_title};
use crate::api::{ContentServiceError, PageSelector, WikiContentService};
use crate::markers::{ensure_noindex, issue_banner};
use crate::rewrite::{PrefixRewriter, RewriteError};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("`{0}` is not a valid issue id (letters, digits, '-' and '.' only)")]
    InvalidIssueId(String),
    #[error("`{0}` is not a valid issue URL")]
    InvalidIssueUrl(String),
    #[error("`{0}` is not a valid page title for an issue page")]
    InvalidTitle(String),
    #[error("{title} is a {actual} page, expected a {expected} page")]
    WrongRealm {
        title: String,
        expected: Realm,
        actual: Realm,
    },
    #[error("new issue page {0} does not say which production version to branch from")]
    MissingSource(String),
    #[error("issue page {0} already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Service(#[from] ContentServiceError),
}

pub fn validate_issue_id(issue_id: &str) -> Result<(), IssueError> {
    let valid = !issue_id.is_empty()
        && issue_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.');
    if valid {
        Ok(())
    } else {
        Err(IssueError::InvalidIssueId(issue_id.to_string()))
    }
}

fn expect_realm(address: &PageAddress, expected: Realm) -> Result<(), IssueError> {
    if address.realm() == expected {
        Ok(())
    } else {
        Err(IssueError::WrongRealm {
            title: address.full_title(),
            expected,
            actual: address.realm(),
        })
    }
}

/// Everything needed to create one issue page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueBranchPlan {
    pub issue: PageAddress,
    /// The production page the issue starts from (same stem as the issue page).
    pub source: PageAddress,
    pub clone_source: bool,
    pub issue_url: Option<String>,
}

impl IssueBranchPlan {
    /// Plans an issue for a production page. With `blank_title` the issue page
    /// gets that stem and starts empty instead of cloning the production text.
    pub fn for_production_page(
        production: &PageAddress,
        issue_id: &str,
        blank_title: Option<&str>,
        issue_url: Option<&str>,
    ) -> Result<Self, IssueError> {
        expect_realm(production, Realm::Production)?;
        validate_issue_id(issue_id)?;
        let issue_url = validate_issue_url(issue_url)?;

        let version = production.version().unwrap_or_default();
        let issue = match blank_title {
            Some(title) => {
                let raw = format!(
                    "{}Vissue-{issue_id}{}{title}",
                    production.namespace(),
                    production.separator()
                );
                parse_title(&raw).map_err(|_| IssueError::InvalidTitle(raw))?
            }
            None => production.as_issue(issue_id),
        };
        let source = issue.in_realm(Realm::Production, version);

        Ok(Self {
            issue,
            source,
            clone_source: blank_title.is_none(),
            issue_url,
        })
    }

    /// Plans from the edit URL of a new issue page carrying `source`, `clone`
    /// and `issue_url` parameters.
    pub fn from_url(url: &UrlAddress) -> Result<Self, IssueError> {
        expect_realm(&url.address, Realm::Issue)?;
        let issue_id = url.address.issue_id().unwrap_or_default();
        validate_issue_id(issue_id)?;
        let version = url
            .source()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| IssueError::MissingSource(url.address.full_title()))?;
        let issue_url = validate_issue_url(url.issue_url())?;

        Ok(Self {
            issue: url.address.clone(),
            source: url.address.in_realm(Realm::Production, version),
            clone_source: url.clone_requested(),
            issue_url,
        })
    }

    pub fn issue_id(&self) -> &str {
        self.issue.issue_id().unwrap_or_default()
    }

    pub fn source_version(&self) -> &str {
        self.source.version().unwrap_or_default()
    }

    /// Edit URL that opens the new issue page with this plan, the form
    /// [`IssueBranchPlan::from_url`] reads back.
    pub fn edit_url(&self, wiki_url: &str) -> Option<Url> {
        let mut url = index_url(wiki_url)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("title", &self.issue.full_title())
                .append_pair("action", "edit")
                .append_pair("source", self.source_version());
            if !self.clone_source {
                query.append_pair("clone", "false");
            }
            if let Some(issue_url) = &self.issue_url {
                query.append_pair("issue_url", issue_url);
            }
        }
        Some(url)
    }

    pub fn summary(&self) -> String {
        if self.clone_source {
            format!(
                "Clone of V{} production page for issue {}",
                self.source_version(),
                self.issue_id()
            )
        } else {
            format!("New page for issue {}", self.issue_id())
        }
    }

    /// Builds the issue page text from the production text (empty when not cloning).
    ///
    /// Production references are pointed at the prepub environment of the same
    /// version, the page is kept out of search indexes and the draft banner is
    /// put on top.
    pub fn prepare_text(&self, original: &str, banner_template: &str) -> Result<String, IssueError> {
        let prepub = self.source.in_realm(Realm::Prepub, self.source_version());
        let rewriter = PrefixRewriter::literal(&self.source.page_prefix(), &prepub.page_prefix())?;
        let body = ensure_noindex(&rewriter.rewrite(original));
        let banner = issue_banner(
            banner_template,
            self.issue_id(),
            &self.source.full_title(),
            self.issue_url.as_deref(),
        );
        Ok(format!("{banner}{body}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchedIssue {
    pub title: String,
    pub page_id: i64,
    pub summary: String,
}

/// Creates the issue page described by `plan`.
pub fn branch_issue<S: WikiContentService + ?Sized>(
    service: &S,
    plan: &IssueBranchPlan,
    banner_template: &str,
) -> Result<BranchedIssue, IssueError> {
    let original = if plan.clone_source {
        service
            .get_page_text(&PageSelector::Title(plan.source.full_title()))?
            .wikitext
    } else {
        String::new()
    };
    let text = plan.prepare_text(&original, banner_template)?;
    let title = plan.issue.full_title();
    let summary = plan.summary();

    let page_id = match service.create_page(&title, &text, &summary) {
        Ok(page_id) => page_id,
        Err(ContentServiceError::AlreadyExists(_)) => {
            return Err(IssueError::AlreadyExists(title));
        }
        Err(error) => return Err(error.into()),
    };
    info!(issue = plan.issue_id(), page = %title, cloned = plan.clone_source, "created issue page");

    Ok(BranchedIssue {
        title,
        page_id,
        summary,
    })
}

/// A prepub version an issue page can be merged into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationTarget {
    pub version: String,
    /// The prepub page with the issue's stem already exists in this version.
    pub page_exists: bool,
    pub title: String,
}

impl IntegrationTarget {
    /// Edit URL that opens the prepub page with the issue preselected.
    pub fn merge_url(&self, issue_id: &str, wiki_url: &str) -> Option<Url> {
        let mut url = index_url(wiki_url)?;
        url.query_pairs_mut()
            .append_pair("title", &self.title)
            .append_pair("action", "edit")
            .append_pair("merge_issue", issue_id);
        Some(url)
    }
}

/// Prepub versions in the issue's namespace; versions where the issue's page
/// already exists come first, each group sorted.
pub fn list_integration_targets<S: WikiContentService + ?Sized>(
    service: &S,
    issue: &PageAddress,
    limit: usize,
) -> Result<Vec<IntegrationTarget>, IssueError> {
    expect_realm(issue, Realm::Issue)?;
    let hits = service.search_by_prefix(&format!("{}Vprepub-", issue.namespace()), None, limit)?;

    let mut versions: BTreeMap<String, bool> = BTreeMap::new();
    for hit in hits {
        let Ok(address) = parse_title(&hit.title) else {
            debug!(title = %hit.title, "no version in prepub title");
            continue;
        };
        let Some(version) = address.version() else {
            continue;
        };
        let same_page = address.title() == issue.title() && address.separator() == issue.separator();
        *versions.entry(version.to_string()).or_insert(false) |= same_page;
    }

    let (mut existing, mut missing): (Vec<_>, Vec<_>) =
        versions.into_iter().partition(|(_, exists)| *exists);
    existing.sort();
    missing.sort();

    Ok(existing
        .into_iter()
        .chain(missing)
        .map(|(version, page_exists)| IntegrationTarget {
            title: issue.in_realm(Realm::Prepub, &version).full_title(),
            version,
            page_exists,
        })
        .collect())
}

fn validate_issue_url(issue_url: Option<&str>) -> Result<Option<String>, IssueError> {
    match issue_url.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Url::parse(value)
            .map(|_| Some(value.to_string()))
            .map_err(|_| IssueError::InvalidIssueUrl(value.to_string())),
        None => Ok(None),
    }
}

fn index_url(wiki_url: &str) -> Option<Url> {
    Url::parse(&format!("{}/index.php", wiki_url.trim().trim_end_matches('/'))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{RequestKind, parse_url};
    use crate::testing::MockWiki;

    fn production(title: &str) -> PageAddress {
        parse_title(title).expect("production title")
    }

    #[test]
    fn issue_ids_are_validated() {
        assert!(validate_issue_id("MM-42").is_ok());
        assert!(validate_issue_id("BITS.7").is_ok());
        assert!(validate_issue_id("").is_err());
        assert!(validate_issue_id("MM 42").is_err());
        assert!(validate_issue_id("MM_42").is_err());
    }

    #[test]
    fn cloned_issue_text_points_at_prepub_and_carries_banner() {
        let plan = IssueBranchPlan::for_production_page(
            &production("MedMij:V2020.01_Lab"),
            "MM-42",
            None,
            Some("https://issues.example/MM-42"),
        )
        .expect("plan");
        assert_eq!(plan.issue.full_title(), "MedMij:Vissue-MM-42_Lab");
        assert_eq!(plan.summary(), "Clone of V2020.01 production page for issue MM-42");

        let text = plan
            .prepare_text("See [[MedMij:V2020.01_Other]].", "IssuePaginaWaarschuwing")
            .expect("text");
        assert_eq!(
            text,
            "{{IssuePaginaWaarschuwing|MM-42|MedMij:V2020.01_Lab|url=https://issues.example/MM-42}}\n\
             __NOINDEX__\nSee [[MedMij:Vprepub-2020.01_Other]]."
        );
    }

    #[test]
    fn blank_issue_pages_use_their_own_stem() {
        let plan = IssueBranchPlan::for_production_page(
            &production("NS:V1.0/Lab"),
            "MM-5",
            Some("Brand new"),
            None,
        )
        .expect("plan");
        assert_eq!(plan.issue.full_title(), "NS:Vissue-MM-5/Brand_new");
        assert!(!plan.clone_source);
        assert_eq!(plan.summary(), "New page for issue MM-5");
        let edit_url = plan.edit_url("https://wiki.example/").expect("edit url");
        assert_eq!(
            edit_url.as_str(),
            "https://wiki.example/index.php?title=NS%3AVissue-MM-5%2FBrand_new&action=edit&source=1.0&clone=false"
        );
        let reread = parse_url(edit_url.as_str(), true).expect("reparse");
        assert_eq!(IssueBranchPlan::from_url(&reread).expect("plan"), plan);
    }

    #[test]
    fn plans_are_rebuilt_from_issue_edit_urls() {
        let url = parse_url(
            "https://wiki.example/index.php?title=NS:Vissue-MM-5_Lab&action=edit&source=1.0&issue_url=https%3A%2F%2Fjira.example%2FMM-5",
            true,
        )
        .expect("url");
        let plan = IssueBranchPlan::from_url(&url).expect("plan");
        assert_eq!(plan.source.full_title(), "NS:V1.0_Lab");
        assert!(plan.clone_source);
        assert_eq!(plan.issue_url.as_deref(), Some("https://jira.example/MM-5"));

        let without_source =
            parse_url("https://wiki.example/index.php?title=NS:Vissue-MM-5_Lab&action=edit", true)
                .expect("url");
        assert!(matches!(
            IssueBranchPlan::from_url(&without_source),
            Err(IssueError::MissingSource(_))
        ));
    }

    #[test]
    fn invalid_inputs_are_rejected_before_any_request() {
        assert!(matches!(
            IssueBranchPlan::for_production_page(&production("NS:Vprepub-1.0_Lab"), "MM-1", None, None),
            Err(IssueError::WrongRealm { .. })
        ));
        assert!(matches!(
            IssueBranchPlan::for_production_page(&production("NS:V1.0_Lab"), "MM 1", None, None),
            Err(IssueError::InvalidIssueId(_))
        ));
        assert!(matches!(
            IssueBranchPlan::for_production_page(
                &production("NS:V1.0_Lab"),
                "MM-1",
                None,
                Some("not a url")
            ),
            Err(IssueError::InvalidIssueUrl(_))
        ));
    }

    #[test]
    fn branch_issue_creates_the_page_once() {
        let wiki = MockWiki::new();
        wiki.add_page("NS:V1.0_Lab", "Body [[NS:V1.0_Other]]");
        let plan =
            IssueBranchPlan::for_production_page(&production("NS:V1.0_Lab"), "MM-3", None, None)
                .expect("plan");

        let branched = branch_issue(&wiki, &plan, "Banner").expect("branch");
        assert_eq!(branched.title, "NS:Vissue-MM-3_Lab");
        assert_eq!(
            wiki.text_of("NS:Vissue-MM-3_Lab").as_deref(),
            Some("{{Banner|MM-3|NS:V1.0_Lab}}\n__NOINDEX__\nBody [[NS:Vprepub-1.0_Other]]")
        );
        assert_eq!(
            wiki.last_edit("NS:Vissue-MM-3_Lab").map(|(comment, _)| comment),
            Some("Clone of V1.0 production page for issue MM-3".to_string())
        );

        assert!(matches!(
            branch_issue(&wiki, &plan, "Banner"),
            Err(IssueError::AlreadyExists(_))
        ));
    }

    #[test]
    fn integration_targets_list_existing_versions_first() {
        let wiki = MockWiki::new();
        wiki.add_page("NS:Vprepub-2.0_Lab", "x");
        wiki.add_page("NS:Vprepub-2.0_Other", "x");
        wiki.add_page("NS:Vprepub-1.0_Lab", "x");
        wiki.add_page("NS:Vprepub-3.0_Other", "x");
        wiki.add_page("NS:Vprepub-1.5/Lab", "x");

        let issue = parse_title("NS:Vissue-MM-1_Lab").expect("issue");
        let targets = list_integration_targets(&wiki, &issue, 500).expect("targets");
        let summary = targets
            .iter()
            .map(|target| (target.version.as_str(), target.page_exists))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![("1.0", true), ("2.0", true), ("1.5", false), ("3.0", false)]
        );
        assert_eq!(targets[0].title, "NS:Vprepub-1.0_Lab");
        let merge_url = targets[2]
            .merge_url("MM-1", "https://wiki.example/")
            .expect("merge url");
        let request = parse_url(merge_url.as_str(), !targets[2].page_exists).expect("request");
        assert_eq!(request.address.full_title(), "NS:Vprepub-1.5/Lab");
        assert_eq!(request.kind, RequestKind::Create);
        assert_eq!(request.merge_issue(), Some("MM-1"));
    }
}
