//! Three-way merge over paragraph atoms.
//!
//! Texts are split on `\n`; every paragraph is one atom and atom equality is
//! exact string equality. Both sides are diffed against the ancestor and the
//! resulting hunks are grouped into regions. A region changed by one side takes
//! that side's atoms, a region changed identically by both sides is a false
//! conflict and resolves cleanly, anything else is a conflict and keeps the
//! ancestor's atoms for manual resolution.

use std::ops::Range;

use serde::Serialize;
use similar::{Algorithm, DiffTag, capture_diff_slices};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRegion {
    /// Paragraph index range in the ancestor.
    pub ancestor_range: Range<usize>,
    pub ancestor: Vec<String>,
    pub current: Vec<String>,
    pub incoming: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub merged_text: String,
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictRegion>,
}

impl MergeOutcome {
    fn verbatim(text: &str) -> Self {
        Self {
            merged_text: text.to_string(),
            has_conflicts: false,
            conflicts: Vec::new(),
        }
    }
}

/// Merges `incoming` into `current` using `ancestor` as the base.
///
/// Without a current page or an ancestor there is nothing to merge against and
/// `incoming` is returned verbatim.
pub fn merge(current: Option<&str>, ancestor: Option<&str>, incoming: &str) -> MergeOutcome {
    let (Some(current), Some(ancestor)) = (current, ancestor) else {
        return MergeOutcome::verbatim(incoming);
    };

    let (current_body, current_nl) = split_trailing_newline(current);
    let (ancestor_body, ancestor_nl) = split_trailing_newline(ancestor);
    let (incoming_body, incoming_nl) = split_trailing_newline(incoming);

    let base = atoms(ancestor_body);
    let ours = atoms(current_body);
    let theirs = atoms(incoming_body);

    let (merged, conflicts) = merge_atoms(&base, &ours, &theirs);

    let mut merged_text = merged.join("\n");
    let trailing_newline = if incoming_nl != ancestor_nl {
        incoming_nl
    } else {
        current_nl
    };
    if trailing_newline {
        merged_text.push('\n');
    }

    MergeOutcome {
        merged_text,
        has_conflicts: !conflicts.is_empty(),
        conflicts,
    }
}

fn split_trailing_newline(text: &str) -> (&str, bool) {
    match text.strip_suffix('\n') {
        Some(body) => (body, true),
        None => (text, false),
    }
}

fn atoms(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Current,
    Incoming,
}

#[derive(Debug, Clone)]
struct Hunk {
    side: Side,
    base: Range<usize>,
    changed: Range<usize>,
}

/// Runs of consecutive non-equal diff ops, as base range to side range.
fn hunks(base: &[&str], changed: &[&str], side: Side) -> Vec<Hunk> {
    let mut out = Vec::new();
    let mut pending: Option<Hunk> = None;

    for op in capture_diff_slices(Algorithm::Myers, base, changed) {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            out.extend(pending.take());
            continue;
        }
        match pending.as_mut() {
            Some(hunk) => {
                hunk.base.end = old.end;
                hunk.changed.end = new.end;
            }
            None => {
                pending = Some(Hunk {
                    side,
                    base: old,
                    changed: new,
                });
            }
        }
    }
    out.extend(pending);
    out
}

/// The span of `side` covering the ancestor region, given that side's hunks in the region.
fn side_span(region: &Range<usize>, side_hunks: &[&Hunk]) -> Option<Range<usize>> {
    let first = side_hunks.first()?;
    let last = side_hunks.last()?;
    let start = first.changed.start - (first.base.start - region.start);
    let end = last.changed.end + (region.end - last.base.end);
    Some(start..end)
}

fn merge_atoms(
    base: &[&str],
    current: &[&str],
    incoming: &[&str],
) -> (Vec<String>, Vec<ConflictRegion>) {
    let mut all = hunks(base, current, Side::Current);
    all.extend(hunks(base, incoming, Side::Incoming));
    all.sort_by_key(|hunk| (hunk.base.start, hunk.side));

    let mut merged: Vec<String> = Vec::new();
    let mut conflicts = Vec::new();
    let mut cursor = 0;
    let mut index = 0;

    while index < all.len() {
        let region_start = all[index].base.start;
        let mut region_end = all[index].base.end;
        let mut next = index + 1;
        while next < all.len() && all[next].base.start <= region_end {
            region_end = region_end.max(all[next].base.end);
            next += 1;
        }
        let region = region_start..region_end;
        let group = &all[index..next];

        merged.extend(base[cursor..region.start].iter().map(|atom| atom.to_string()));

        let current_hunks = group
            .iter()
            .filter(|hunk| hunk.side == Side::Current)
            .collect::<Vec<_>>();
        let incoming_hunks = group
            .iter()
            .filter(|hunk| hunk.side == Side::Incoming)
            .collect::<Vec<_>>();

        match (
            side_span(&region, &current_hunks),
            side_span(&region, &incoming_hunks),
        ) {
            (Some(span), None) => {
                merged.extend(current[span].iter().map(|atom| atom.to_string()));
            }
            (None, Some(span)) => {
                merged.extend(incoming[span].iter().map(|atom| atom.to_string()));
            }
            (Some(ours), Some(theirs)) => {
                if current[ours.clone()] == incoming[theirs.clone()] {
                    merged.extend(current[ours].iter().map(|atom| atom.to_string()));
                } else {
                    merged.extend(base[region.clone()].iter().map(|atom| atom.to_string()));
                    conflicts.push(ConflictRegion {
                        ancestor: to_owned(&base[region.clone()]),
                        current: to_owned(&current[ours]),
                        incoming: to_owned(&incoming[theirs]),
                        ancestor_range: region.clone(),
                    });
                }
            }
            (None, None) => {}
        }

        cursor = region.end;
        index = next;
    }

    merged.extend(base[cursor..].iter().map(|atom| atom.to_string()));
    (merged, conflicts)
}

fn to_owned(atoms: &[&str]) -> Vec<String> {
    atoms.iter().map(|atom| atom.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_paragraph_keeps_ancestor_text() {
        let outcome = merge(Some("A\nB2\nC"), Some("A\nB\nC"), "A\nB3\nC");
        assert!(outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "A\nB\nC");
        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.ancestor_range, 1..2);
        assert_eq!(conflict.ancestor, vec!["B".to_string()]);
        assert_eq!(conflict.current, vec!["B2".to_string()]);
        assert_eq!(conflict.incoming, vec!["B3".to_string()]);
    }

    #[test]
    fn identical_edits_are_not_conflicts() {
        let outcome = merge(Some("A\nB2\nC"), Some("A\nB\nC"), "A\nB2\nC");
        assert!(!outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "A\nB2\nC");
    }

    #[test]
    fn one_sided_edits_are_taken_from_either_side() {
        let outcome = merge(
            Some("Intro\nBody\nCurrent footer"),
            Some("Intro\nBody\nFooter"),
            "Issue intro\nBody\nFooter",
        );
        assert!(!outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "Issue intro\nBody\nCurrent footer");
    }

    #[test]
    fn insertions_and_deletions_merge_cleanly_when_separated() {
        let outcome = merge(
            Some("A\nB\nC\nD"),
            Some("A\nB\nC\nD\nE"),
            "A\nNew\nB\nC\nD\nE",
        );
        assert!(!outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "A\nNew\nB\nC\nD");
    }

    #[test]
    fn competing_insertions_at_the_same_point_conflict() {
        let outcome = merge(Some("A\nX\nB"), Some("A\nB"), "A\nY\nB");
        assert!(outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "A\nB");
        assert!(outcome.conflicts[0].ancestor.is_empty());
    }

    #[test]
    fn missing_ancestor_or_current_returns_incoming_verbatim() {
        let outcome = merge(None, None, "Fresh page\n");
        assert_eq!(outcome, MergeOutcome::verbatim("Fresh page\n"));
        let outcome = merge(Some("Old"), None, "New");
        assert_eq!(outcome.merged_text, "New");
        assert!(!outcome.has_conflicts);
    }

    #[test]
    fn trailing_newline_difference_is_not_a_conflict() {
        let outcome = merge(Some("A\nB\n"), Some("A\nB"), "A\nB");
        assert!(!outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "A\nB\n");

        let outcome = merge(Some("A\nB2\n"), Some("A\nB\n"), "A\nB2");
        assert!(!outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "A\nB2");
    }

    #[test]
    fn blank_lines_are_atoms_too() {
        let outcome = merge(
            Some("Title\n\nFirst\n\nSecond"),
            Some("Title\n\nFirst\n\nSecond"),
            "Title\n\nFirst\n\nThird\n\nSecond",
        );
        assert!(!outcome.has_conflicts);
        assert_eq!(outcome.merged_text, "Title\n\nFirst\n\nThird\n\nSecond");
    }
}
