//! Verse split locator and block splitter.
//!
//! Two texts of the same book rarely break their blocks at the same places.
//! [`verse_split_locations`] records every verse boundary at which one text
//! starts a block, and [`apply_splits_to_align`] splits the other text's
//! blocks at those boundaries so the two segmentations become comparable.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ra_core::{Block, VerseRef, Versification};

// ---------------------------------------------------------------------------
// VerseSplitLocation
// ---------------------------------------------------------------------------

/// A clean break in a block sequence: one block ends at `after` and the next
/// starts at the verse start `before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseSplitLocation {
    pub after: VerseRef,
    pub before: VerseRef,
}

/// Every verse boundary of `blocks` at which a block begins with a verse
/// marker, in block order. References are in the versification of `blocks`.
pub fn verse_split_locations(blocks: &[Block], book: u8) -> Vec<VerseSplitLocation> {
    blocks
        .windows(2)
        .filter(|pair| pair[1].starts_at_verse_start())
        .map(|pair| VerseSplitLocation {
            after: pair[0].end_ref(book),
            before: pair[1].start_ref(book),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Splitter
// ---------------------------------------------------------------------------

/// Split `blocks[index]` immediately after `verse`, inserting the new piece at
/// `index + 1`. Returns `false` and changes nothing when the block cannot be
/// split there (see [`Block::split_after_verse`]).
pub fn try_split_at_verse_end(blocks: &mut Vec<Block>, index: usize, verse: u32) -> bool {
    match blocks.get_mut(index).and_then(|b| b.split_after_verse(verse)) {
        Some(tail) => {
            blocks.insert(index + 1, tail);
            true
        }
        None => false,
    }
}

/// Split `blocks` wherever a block straddles one of `locations`.
///
/// `blocks` are numbered in `block_versification`, `locations` in
/// `location_versification`; each location is converted before comparison. A
/// location whose `after` is verse 0 steps back to the preceding verse first,
/// since verse 0 is rarely mapped between tables. Blocks that already match
/// a reference block are left alone unless `allow_splitting_already_matched`.
///
/// Returns whether any block was split.
pub fn apply_splits_to_align(
    blocks: &mut Vec<Block>,
    book: u8,
    block_versification: &Versification,
    locations: &[VerseSplitLocation],
    location_versification: &Versification,
    allow_splitting_already_matched: bool,
) -> bool {
    let mut split_any = false;
    let mut i = 0;

    for location in locations {
        let after = if location.after.verse == 0 {
            location_versification.previous_verse(location.after)
        } else {
            location.after
        };
        let after = location_versification.convert(after, block_versification);

        while blocks
            .get(i)
            .is_some_and(|b| b.end_ref(book) < after)
        {
            i += 1;
        }
        let Some(block) = blocks.get(i) else {
            break;
        };

        let straddles = block.chapter == after.chapter
            && block.initial_start_verse <= after.verse
            && after.verse < block.last_verse_num();
        if !straddles {
            continue;
        }
        if !block.is_scripture() {
            continue;
        }
        if block.matches_reference_text() && !allow_splitting_already_matched {
            continue;
        }

        if try_split_at_verse_end(blocks, i, after.verse) {
            debug!(%after, "split block at verse boundary");
            split_any = true;
            i += 1;
        } else if !blocks[i].has_bridge_spanning(after.verse) {
            warn!(%after, before = %location.before, "unable to split block at verse boundary");
        }
    }

    split_any
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
