//! Property-based test generators using proptest.

use crate::fixtures::Note;
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for notes with random content and a fresh id.
pub fn note_strategy() -> impl Strategy<Value = Note> {
    (
        "[A-Za-z ]{1,24}",
        "[a-z ]{0,64}",
        proptest::option::of("[a-z]{1,8}"),
        any::<u128>(),
    )
        .prop_map(|(title, body, folder, id)| Note {
            id: Uuid::from_u128(id),
            title,
            body,
            folder,
            version: 0,
        })
}

/// Strategy for up to `max` notes with distinct ids.
pub fn notes_strategy(max: usize) -> impl Strategy<Value = Vec<Note>> {
    proptest::collection::vec(note_strategy(), 0..=max).prop_map(|mut notes| {
        notes.sort_by_key(|n| n.id);
        notes.dedup_by_key(|n| n.id);
        notes
    })
}

/// Strategy for a valid `(page, page_size, total_items)` triple.
pub fn page_window_strategy() -> impl Strategy<Value = (u32, u32, u64)> {
    (1u32..=500, 1u32..=200, 0u64..=100_000)
}
