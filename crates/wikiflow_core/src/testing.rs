//! In-memory wiki used by the orchestrator tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::api::{
    ContentServiceError, PageSelector, PageText, PrefixHit, RevisionInfo, WikiContentService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum MockOp {
    GetText,
    History,
    Search,
    Write,
    Create,
    Delete,
    Move,
    Duplicate,
}

#[derive(Debug, Clone)]
struct MockRevision {
    id: i64,
    text: String,
    comment: String,
    minor: bool,
}

#[derive(Debug, Clone)]
struct MockPage {
    title: String,
    /// Oldest first.
    revisions: Vec<MockRevision>,
}

#[derive(Debug, Default)]
struct MockState {
    pages: BTreeMap<i64, MockPage>,
    next_page_id: i64,
    next_revision_id: i64,
    failures: BTreeSet<(MockOp, String)>,
    calls: Vec<String>,
}

impl MockState {
    fn id_of(&self, title: &str) -> Option<i64> {
        self.pages
            .iter()
            .find(|(_, page)| page.title == title)
            .map(|(id, _)| *id)
    }

    fn title_of(&self, page_id: i64) -> String {
        self.pages
            .get(&page_id)
            .map(|page| page.title.clone())
            .unwrap_or_else(|| format!("#{page_id}"))
    }

    fn check(&mut self, op: MockOp, target: &str) -> Result<(), ContentServiceError> {
        self.calls.push(format!("{op:?} {target}"));
        if self.failures.contains(&(op, target.to_string())) {
            return Err(ContentServiceError::Api {
                code: "injected".to_string(),
                info: format!("{op:?} failed for {target}"),
            });
        }
        Ok(())
    }

    fn push_revision(&mut self, page_id: i64, text: &str, comment: &str, minor: bool) {
        self.next_revision_id += 1;
        let id = self.next_revision_id;
        if let Some(page) = self.pages.get_mut(&page_id) {
            page.revisions.push(MockRevision {
                id,
                text: text.to_string(),
                comment: comment.to_string(),
                minor,
            });
        }
    }

    fn insert_page(&mut self, title: &str, text: &str, comment: &str) -> i64 {
        self.next_page_id += 1;
        let page_id = self.next_page_id;
        self.pages.insert(
            page_id,
            MockPage {
                title: title.to_string(),
                revisions: Vec::new(),
            },
        );
        self.push_revision(page_id, text, comment, false);
        page_id
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockWiki {
    state: Mutex<MockState>,
}

impl MockWiki {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock wiki lock")
    }

    pub(crate) fn add_page(&self, title: &str, text: &str) -> i64 {
        self.state().insert_page(title, text, "created")
    }

    pub(crate) fn add_revision(&self, page_id: i64, text: &str) {
        self.state().push_revision(page_id, text, "edited", false);
    }

    pub(crate) fn fail_on(&self, op: MockOp, title: &str) {
        self.state().failures.insert((op, title.to_string()));
    }

    pub(crate) fn page_id(&self, title: &str) -> Option<i64> {
        self.state().id_of(title)
    }

    pub(crate) fn exists(&self, title: &str) -> bool {
        self.page_id(title).is_some()
    }

    pub(crate) fn text_of(&self, title: &str) -> Option<String> {
        let state = self.state();
        let id = state.id_of(title)?;
        state.pages[&id]
            .revisions
            .last()
            .map(|revision| revision.text.clone())
    }

    pub(crate) fn revision_count(&self, title: &str) -> usize {
        let state = self.state();
        state
            .id_of(title)
            .map(|id| state.pages[&id].revisions.len())
            .unwrap_or(0)
    }

    /// Comment and minor flag of the latest revision.
    pub(crate) fn last_edit(&self, title: &str) -> Option<(String, bool)> {
        let state = self.state();
        let id = state.id_of(title)?;
        state.pages[&id]
            .revisions
            .last()
            .map(|revision| (revision.comment.clone(), revision.minor))
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        let mut titles = self
            .state()
            .pages
            .values()
            .map(|page| page.title.clone())
            .collect::<Vec<_>>();
        titles.sort();
        titles
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

impl WikiContentService for MockWiki {
    fn get_page_text(&self, selector: &PageSelector) -> Result<PageText, ContentServiceError> {
        let mut state = self.state();
        let found = match selector {
            PageSelector::Title(title) => state.id_of(title).and_then(|id| {
                state.pages[&id]
                    .revisions
                    .last()
                    .map(|revision| (id, revision.clone()))
            }),
            PageSelector::PageId(page_id) => state.pages.get(page_id).and_then(|page| {
                page.revisions
                    .last()
                    .map(|revision| (*page_id, revision.clone()))
            }),
            PageSelector::Revision(revision_id) => state.pages.iter().find_map(|(id, page)| {
                page.revisions
                    .iter()
                    .find(|revision| revision.id == *revision_id)
                    .map(|revision| (*id, revision.clone()))
            }),
        };
        let target = match &found {
            Some((id, _)) => state.title_of(*id),
            None => selector.to_string(),
        };
        state.check(MockOp::GetText, &target)?;
        let (page_id, revision) =
            found.ok_or_else(|| ContentServiceError::NotFound(selector.to_string()))?;
        Ok(PageText {
            title: target,
            page_id,
            revision_id: revision.id,
            wikitext: revision.text,
        })
    }

    fn get_revision_history(&self, page_id: i64) -> Result<Vec<RevisionInfo>, ContentServiceError> {
        let mut state = self.state();
        let title = state.title_of(page_id);
        state.check(MockOp::History, &title)?;
        let page = state
            .pages
            .get(&page_id)
            .ok_or_else(|| ContentServiceError::NotFound(format!("page id {page_id}")))?;
        let mut history = Vec::with_capacity(page.revisions.len());
        let mut parent_id = 0;
        for revision in &page.revisions {
            history.push(RevisionInfo {
                revision_id: revision.id,
                parent_id,
                user: "Editor".to_string(),
                timestamp: format!("2020-01-01T00:00:{:02}Z", revision.id % 60),
                comment: revision.comment.clone(),
            });
            parent_id = revision.id;
        }
        history.reverse();
        Ok(history)
    }

    fn search_by_prefix(
        &self,
        prefix: &str,
        _namespace: Option<i32>,
        limit: usize,
    ) -> Result<Vec<PrefixHit>, ContentServiceError> {
        let mut state = self.state();
        state.check(MockOp::Search, prefix)?;
        let mut hits = state
            .pages
            .iter()
            .filter(|(_, page)| page.title.starts_with(prefix))
            .map(|(id, page)| PrefixHit {
                title: page.title.clone(),
                page_id: *id,
            })
            .collect::<Vec<_>>();
        hits.sort_by(|left, right| left.title.cmp(&right.title));
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
        let mut state = self.state();
        let title = state.title_of(page_id);
        state.check(MockOp::Write, &title)?;
        if !state.pages.contains_key(&page_id) {
            return Err(ContentServiceError::NotFound(format!("page id {page_id}")));
        }
        state.push_revision(page_id, text, summary, is_minor);
        Ok(())
    }

    fn create_page(
        &self,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<i64, ContentServiceError> {
        let mut state = self.state();
        state.check(MockOp::Create, title)?;
        if state.id_of(title).is_some() {
            return Err(ContentServiceError::AlreadyExists(title.to_string()));
        }
        Ok(state.insert_page(title, text, summary))
    }

    fn delete_page(&self, page_id: i64) -> Result<(), ContentServiceError> {
        let mut state = self.state();
        let title = state.title_of(page_id);
        state.check(MockOp::Delete, &title)?;
        state.pages.remove(&page_id);
        Ok(())
    }

    fn move_page(&self, page_id: i64, new_title: &str) -> Result<(), ContentServiceError> {
        let mut state = self.state();
        let title = state.title_of(page_id);
        state.check(MockOp::Move, &title)?;
        if state.id_of(new_title).is_some() {
            return Err(ContentServiceError::AlreadyExists(new_title.to_string()));
        }
        let page = state
            .pages
            .get_mut(&page_id)
            .ok_or_else(|| ContentServiceError::NotFound(format!("page id {page_id}")))?;
        page.title = new_title.to_string();
        Ok(())
    }

    fn duplicate_page_with_history(
        &self,
        title: &str,
        new_title: &str,
    ) -> Result<(), ContentServiceError> {
        let mut state = self.state();
        state.check(MockOp::Duplicate, title)?;
        let source_id = state
            .id_of(title)
            .ok_or_else(|| ContentServiceError::NotFound(title.to_string()))?;
        if state.id_of(new_title).is_some() {
            return Err(ContentServiceError::AlreadyExists(new_title.to_string()));
        }
        let revisions = state.pages[&source_id].revisions.clone();
        state.next_page_id += 1;
        let page_id = state.next_page_id;
        state.pages.insert(
            page_id,
            MockPage {
                title: new_title.to_string(),
                revisions: Vec::new(),
            },
        );
        for revision in revisions {
            state.push_revision(page_id, &revision.text, &revision.comment, revision.minor);
        }
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.state().calls.len()
    }
}
