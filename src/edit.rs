//! Text edits and the batch edit applier
//!
//! All corrections compile down to [`Edit`]s: replace the bytes of a span with
//! new text. [`apply`] takes the original text and a batch of edits and builds
//! the corrected text in one pass, refusing overlapping edits instead of
//! guessing which one should win.

use crate::source::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Replace the text currently spanning `span` with `replacement`.
///
/// An empty span is a pure insertion; an empty replacement is a pure deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edit {
    pub span: Span,
    pub replacement: String,
}

impl Edit {
    pub fn new(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(Span::point(offset), text)
    }

    pub fn delete(span: Span) -> Self {
        Self::new(span, String::new())
    }

    pub fn is_insertion(&self) -> bool {
        self.span.is_empty()
    }

    /// True if applying both edits in one batch is ambiguous.
    ///
    /// Spans conflict when they share an offset. A zero-length insertion only
    /// conflicts when it falls strictly inside the other span; insertions at a
    /// boundary (including two insertions at the same offset) are ordered.
    pub fn conflicts_with(&self, other: &Edit) -> bool {
        let (a, b) = (self.span, other.span);
        if a.is_empty() && b.is_empty() {
            return false;
        }
        if a.is_empty() {
            return a.start > b.start && a.start < b.end;
        }
        if b.is_empty() {
            return b.start > a.start && b.start < a.end;
        }
        a.start < b.end && b.start < a.end
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {:?}", self.span, self.replacement)
    }
}

/// Why a batch of edits could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("conflicting edits: {first} overlaps {second}")]
    Conflict { first: Edit, second: Edit },

    #[error("edit {edit} is outside the text (length {len})")]
    OutOfBounds { edit: Edit, len: usize },

    #[error("edit {edit} does not fall on character boundaries")]
    NotCharBoundary { edit: Edit },
}

/// Indices of `edits` in application order: start, then end, then input order
fn application_order(edits: &[Edit]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..edits.len()).collect();
    order.sort_by_key(|&i| (edits[i].span.start, edits[i].span.end));
    order
}

/// Every pair of conflicting edits, as `(earlier, later)` indices in input order.
///
/// Pairs are listed in application order of their first member.
pub fn find_conflicts(edits: &[Edit]) -> Vec<(usize, usize)> {
    let order = application_order(edits);
    let mut conflicts = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        for &j in &order[pos + 1..] {
            // Sorted by start: nothing further along can reach back into edit i
            if edits[j].span.start > edits[i].span.end {
                break;
            }
            if edits[i].conflicts_with(&edits[j]) {
                conflicts.push((i.min(j), i.max(j)));
            }
        }
    }

    conflicts
}

/// Check that every edit fits inside `text` on character boundaries
pub fn check_bounds(text: &str, edits: &[Edit]) -> Result<(), EditError> {
    for edit in edits {
        if edit.span.end > text.len() {
            return Err(EditError::OutOfBounds {
                edit: edit.clone(),
                len: text.len(),
            });
        }
        if !text.is_char_boundary(edit.span.start) || !text.is_char_boundary(edit.span.end) {
            return Err(EditError::NotCharBoundary { edit: edit.clone() });
        }
    }
    Ok(())
}

/// Apply a batch of edits to `text`, producing the corrected text.
///
/// Pure function: the input is never modified, and the same input always
/// yields the same output. Overlapping edits fail with
/// [`EditError::Conflict`] naming both edits.
pub fn apply(text: &str, edits: &[Edit]) -> Result<String, EditError> {
    if edits.is_empty() {
        return Ok(text.to_string());
    }

    check_bounds(text, edits)?;
    if let Some(&(first, second)) = find_conflicts(edits).first() {
        return Err(EditError::Conflict {
            first: edits[first].clone(),
            second: edits[second].clone(),
        });
    }

    let extra: usize = edits.iter().map(|e| e.replacement.len()).sum();
    let mut output = String::with_capacity(text.len() + extra);
    let mut cursor = 0;
    for i in application_order(edits) {
        let edit = &edits[i];
        output.push_str(&text[cursor..edit.span.start]);
        output.push_str(&edit.replacement);
        cursor = edit.span.end;
    }
    output.push_str(&text[cursor..]);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_batch_is_identity() {
        let text = "class A\nend\n";
        assert_eq!(apply(text, &[]).unwrap(), text);
    }

    #[test]
    fn test_insert_replace_delete() {
        let text = "class A\n  def self.call\n  end\nend\n";
        let edits = vec![
            Edit::delete(Span::new(14, 19)),
            Edit::insert(7, "\n  include ServiceBase"),
        ];
        assert_eq!(
            apply(text, &edits).unwrap(),
            "class A\n  include ServiceBase\n  def call\n  end\nend\n"
        );

        let edits = vec![Edit::new(Span::new(6, 7), "Service")];
        assert_eq!(apply(text, &edits).unwrap(), "class Service\n  def self.call\n  end\nend\n");
    }

    #[test]
    fn test_insertion_before_replacement_at_same_offset() {
        let text = "abcdef";
        let edits = vec![Edit::new(Span::new(2, 4), "XY"), Edit::insert(2, "<")];
        assert_eq!(apply(text, &edits).unwrap(), "ab<XYef");

        // Insertion at the end boundary of a replacement is not a conflict either
        let edits = vec![Edit::insert(4, ">"), Edit::new(Span::new(2, 4), "XY")];
        assert_eq!(apply(text, &edits).unwrap(), "abXY>ef");
    }

    #[test]
    fn test_insertions_at_same_offset_keep_input_order() {
        let edits = vec![Edit::insert(1, "1"), Edit::insert(1, "2")];
        assert_eq!(apply("ab", &edits).unwrap(), "a12b");
    }

    #[test]
    fn test_overlap_is_conflict() {
        let first = Edit::new(Span::new(0, 4), "x");
        let second = Edit::new(Span::new(3, 6), "y");
        assert_eq!(
            apply("abcdef", &[first.clone(), second.clone()]),
            Err(EditError::Conflict { first, second })
        );
    }

    #[test]
    fn test_insertion_inside_span_is_conflict() {
        let edits = vec![Edit::new(Span::new(0, 4), "x"), Edit::insert(2, "y")];
        assert!(matches!(
            apply("abcdef", &edits),
            Err(EditError::Conflict { .. })
        ));
    }

    #[test]
    fn test_adjacent_edits_do_not_conflict() {
        let edits = vec![
            Edit::new(Span::new(3, 6), "DEF"),
            Edit::new(Span::new(0, 3), "ABC"),
        ];
        assert_eq!(apply("abcdef", &edits).unwrap(), "ABCDEF");
        assert!(find_conflicts(&edits).is_empty());
    }

    #[test]
    fn test_find_conflicts_reports_every_pair() {
        let edits = vec![
            Edit::new(Span::new(0, 10), "a"),
            Edit::new(Span::new(2, 3), "b"),
            Edit::new(Span::new(5, 6), "c"),
            Edit::new(Span::new(12, 14), "d"),
        ];
        assert_eq!(find_conflicts(&edits), vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn test_identical_replacements_conflict() {
        let edit = Edit::new(Span::new(1, 2), "x");
        assert_eq!(find_conflicts(&[edit.clone(), edit]), vec![(0, 1)]);
    }

    #[test]
    fn test_bounds() {
        assert!(matches!(
            apply("abc", &[Edit::insert(4, "x")]),
            Err(EditError::OutOfBounds { len: 3, .. })
        ));
        assert!(matches!(
            apply("é", &[Edit::insert(1, "x")]),
            Err(EditError::NotCharBoundary { .. })
        ));
    }

    #[test]
    fn test_apply_is_deterministic() {
        let text = "def self.call\nend\n";
        let edits = vec![Edit::delete(Span::new(4, 9)), Edit::insert(0, "# fixed\n")];
        let first = apply(text, &edits).unwrap();
        let second = apply(&text.to_string(), &edits).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "# fixed\ndef call\nend\n");
    }
}
