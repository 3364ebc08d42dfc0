use std::ops::Range;
use std::sync::Arc;

use crate::block::Block;
use crate::error::{RaError, Result};
use crate::verse::{book_number, Versification};

// ---------------------------------------------------------------------------
// BookScript
// ---------------------------------------------------------------------------

/// The ordered blocks of one book, together with the versification table
/// its verse numbers are expressed in.
#[derive(Debug, Clone)]
pub struct BookScript {
    book_id: String,
    book_number: u8,
    versification: Arc<Versification>,
    blocks: Vec<Block>,
}

impl BookScript {
    /// Fails with [`RaError::InvalidInput`] when `book_id` is not a canonical
    /// three-letter book code.
    pub fn new(book_id: &str, versification: Arc<Versification>, blocks: Vec<Block>) -> Result<Self> {
        let number = book_number(book_id)
            .ok_or_else(|| RaError::InvalidInput(format!("unknown book id '{book_id}'")))?;
        Ok(Self {
            book_id: book_id.to_ascii_uppercase(),
            book_number: number,
            versification,
            blocks,
        })
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn book_number(&self) -> u8 {
        self.book_number
    }

    pub fn versification(&self) -> &Arc<Versification> {
        &self.versification
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Index range of the blocks covering `chapter:verse`, from the first
    /// covering block through the last. Empty when no block covers it.
    pub fn blocks_for_verse(&self, chapter: u32, verse: u32) -> Range<usize> {
        let covers = |b: &Block| b.chapter == chapter && b.covers_verse(verse);
        match self.blocks.iter().position(covers) {
            Some(first) => {
                let last = self.blocks.iter().rposition(covers).unwrap_or(first);
                first..last + 1
            }
            None => 0..0,
        }
    }

    /// Replace `count` blocks starting at `start` with `replacement`.
    pub fn replace_blocks(&mut self, start: usize, count: usize, replacement: Vec<Block>) -> Result<()> {
        let end = start
            .checked_add(count)
            .filter(|end| *end <= self.blocks.len())
            .ok_or_else(|| {
                RaError::InvalidInput(format!(
                    "block range {start}+{count} out of bounds for {} ({} blocks)",
                    self.book_id,
                    self.blocks.len()
                ))
            })?;
        self.blocks.splice(start..end, replacement);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chunk boundaries
// ---------------------------------------------------------------------------

/// Starting at `index`, advance to the last block before the next clean
/// verse break and return its index.
///
/// A clean break exists before block `i + 1` when that block starts at a
/// verse start and `can_break_before` accepts it. Advancement always stops
/// before a chapter announcement.
pub fn advance_to_clean_verse_break<F>(blocks: &[Block], index: usize, mut can_break_before: F) -> usize
where
    F: FnMut(&Block) -> bool,
{
    let mut i = index;
    while let Some(next) = blocks.get(i + 1) {
        if next.is_chapter_announcement() {
            break;
        }
        if next.starts_at_verse_start() && can_break_before(next) {
            break;
        }
        i += 1;
    }
    i
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
