//! Unsaved-change detection
//!
//! Compares the draft against the last server-confirmed snapshot token by
//! token. Runs of whitespace are not significant: "a  b" and "a b" compare
//! equal. This is looser than exact string equality.

use crate::models::DocumentContent;

/// Whether the draft has changes the snapshot does not
pub fn is_dirty(snapshot: &DocumentContent, draft: &DocumentContent) -> bool {
    tokens_differ(&snapshot.title, &draft.title) || tokens_differ(&snapshot.text, &draft.text)
}

fn tokens_differ(a: &str, b: &str) -> bool {
    !a.split_whitespace().eq(b.split_whitespace())
}
