use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use ra_core::{
    advance_to_clean_verse_break, parse_verse_marked_text, Block, BlockElement, BookScript,
    MultiBlockQuote, RaError, ReferenceLanguageInfo, Result, VerseRef,
};

// ---------------------------------------------------------------------------
// ApplyOutcome
// ---------------------------------------------------------------------------

/// What [`BlockMatchup::apply`] wrote back to the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Index in the book of the first window block.
    pub start_index: usize,
    /// Number of book blocks the window now covers.
    pub block_count: usize,
    /// The book's range was replaced wholesale because the window was split.
    pub replaced: bool,
    /// Continuation blocks after the window whose speaker was re-synchronized.
    pub continuations_updated: usize,
}

// ---------------------------------------------------------------------------
// BlockMatchup
// ---------------------------------------------------------------------------

/// An editable window of cloned blocks around one anchor block.
///
/// Edits (reference text, speakers, splits) are made on the clones; nothing
/// reaches the book until [`BlockMatchup::apply`].
#[derive(Debug, Clone)]
pub struct BlockMatchup {
    book_number: u8,
    start_index: usize,
    original_count: usize,
    original_blocks: Vec<Block>,
    correlated: Vec<Block>,
    anchor_index: usize,
    blocks_added_by_splitting: usize,
    pub(crate) language: ReferenceLanguageInfo,
}

impl BlockMatchup {
    /// Build the window around `book.blocks()[anchor]`.
    ///
    /// With `predetermined_count == 0` the window is the verse group of the
    /// anchor: it extends back to the verse start of the anchor's first
    /// verse, then further back verse by verse while `can_break` refuses the
    /// start; forward to the next clean break `can_break` accepts, dropping
    /// trailing non-Scripture blocks. Every block of one verse group yields
    /// the same window. Otherwise the window is exactly `predetermined_count`
    /// blocks starting at `anchor`.
    ///
    /// The window's blocks are cloned before `split` runs on them.
    pub fn build<S, P>(
        book: &BookScript,
        anchor: usize,
        split: S,
        can_break: P,
        language: &ReferenceLanguageInfo,
        predetermined_count: usize,
    ) -> Result<Self>
    where
        S: FnOnce(&mut Vec<Block>),
        P: Fn(VerseRef) -> bool,
    {
        let blocks = book.blocks();
        let book_number = book.book_number();
        if anchor >= blocks.len() {
            return Err(RaError::InvalidInput(format!(
                "anchor {anchor} out of range for {} ({} blocks)",
                book.book_id(),
                blocks.len()
            )));
        }

        let (start, last) = if predetermined_count > 0 {
            let last = anchor + predetermined_count - 1;
            if last >= blocks.len() {
                return Err(RaError::InvalidInput(format!(
                    "window of {predetermined_count} blocks at {anchor} runs past the end of {}",
                    book.book_id()
                )));
            }
            (anchor, last)
        } else {
            verse_group(blocks, anchor, |b| can_break(b.start_ref(book_number)))
        };

        let anchor_in_window = if (start..=last).contains(&anchor) {
            anchor
        } else if anchor > last && !blocks[anchor].is_scripture() {
            debug!(anchor, last, "anchor trimmed from end of window");
            last
        } else {
            warn!(
                book = book.book_id(),
                anchor, start, last, "anchor block not found in its own verse group"
            );
            return Self::from_range(book_number, blocks, anchor, anchor, anchor, split, language);
        };

        Self::from_range(book_number, blocks, start, last, anchor_in_window, split, language)
    }

    fn from_range<S>(
        book_number: u8,
        blocks: &[Block],
        start: usize,
        last: usize,
        anchor: usize,
        split: S,
        language: &ReferenceLanguageInfo,
    ) -> Result<Self>
    where
        S: FnOnce(&mut Vec<Block>),
    {
        let original_blocks = blocks[start..=last].to_vec();
        let mut correlated = original_blocks.clone();
        let elements_before_anchor: usize = original_blocks[..anchor - start]
            .iter()
            .map(|b| b.elements.len())
            .sum();

        split(&mut correlated);

        let blocks_added_by_splitting = correlated.len().saturating_sub(original_blocks.len());
        let anchor_index = correlated
            .iter()
            .scan(0, |seen, b| {
                let before = *seen;
                *seen += b.elements.len();
                Some(before)
            })
            .position(|before| before >= elements_before_anchor)
            .unwrap_or(correlated.len().saturating_sub(1));

        Ok(Self {
            book_number,
            start_index: start,
            original_count: original_blocks.len(),
            original_blocks,
            correlated,
            anchor_index,
            blocks_added_by_splitting,
            language: language.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn correlated_blocks(&self) -> &[Block] {
        &self.correlated
    }

    pub fn correlated_blocks_mut(&mut self) -> &mut [Block] {
        &mut self.correlated
    }

    /// The book's blocks as they were when the window was built (or last
    /// applied).
    pub fn original_blocks(&self) -> &[Block] {
        &self.original_blocks
    }

    pub fn index_of_start_block_in_book(&self) -> usize {
        self.start_index
    }

    pub fn blocks_added_by_splitting(&self) -> usize {
        self.blocks_added_by_splitting
    }

    pub fn book_number(&self) -> u8 {
        self.book_number
    }

    pub fn language(&self) -> &ReferenceLanguageInfo {
        &self.language
    }

    pub fn correlated_anchor_index(&self) -> usize {
        self.anchor_index
    }

    pub fn correlated_anchor_block(&self) -> &Block {
        &self.correlated[self.anchor_index]
    }

    /// Move the anchor to another block of the window.
    pub fn change_anchor(&mut self, index: usize) -> Result<()> {
        if index >= self.correlated.len() {
            return Err(RaError::InvalidInput(format!(
                "anchor {index} outside window of {} blocks",
                self.correlated.len()
            )));
        }
        self.anchor_index = index;
        Ok(())
    }

    /// Whether `book_index` lies in the range of book blocks this window
    /// covers.
    pub fn includes_book_index(&self, book_index: usize) -> bool {
        (self.start_index..self.start_index + self.original_count).contains(&book_index)
    }

    pub fn all_scripture_blocks_match(&self) -> bool {
        self.unmatched_indices().is_empty()
    }

    /// Window indices of Scripture blocks without exactly one reference block.
    pub fn unmatched_indices(&self) -> Vec<usize> {
        self.correlated
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_scripture() && !b.matches_reference_text())
            .map(|(i, _)| i)
            .collect()
    }

    /// `true` when applying the window would change the book.
    pub fn has_outstanding_changes(&self) -> bool {
        self.blocks_added_by_splitting > 0 || self.correlated != self.original_blocks
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Give every Scripture block exactly one reference block, combining
    /// candidates or attaching an empty reference block, and take the speaker
    /// from the reference wherever the block's own speaker is unclear.
    pub fn match_all_blocks(&mut self) {
        for block in self.correlated.iter_mut().filter(|b| b.is_scripture()) {
            if !block.matches_reference_text() {
                let combined = Block::combine(block.reference_blocks().iter());
                let reference = combined.unwrap_or_else(|| block.empty_reference());
                block.set_matched_reference_block(reference);
            }
            if block.character.is_unclear() {
                if let Some(reference) = block.matched_reference().cloned() {
                    block.set_character_and_delivery_from(&reference);
                }
            }
        }
    }

    /// Replace the reference text at `level` of block `index` with `text`,
    /// in which verse markers may be written `{5}` or `{5-6}`.
    ///
    /// Missing reference blocks down to `level` are created empty. Text that
    /// does not open with a verse marker continues the verse the previous
    /// block's reference ended in, and that verse is carried forward into
    /// the following blocks until one starts a verse of its own.
    pub fn set_reference_text(&mut self, index: usize, text: &str, level: usize) -> Result<()> {
        if index >= self.correlated.len() {
            return Err(RaError::InvalidInput(format!(
                "block {index} outside window of {} blocks",
                self.correlated.len()
            )));
        }
        let inherited = index
            .checked_sub(1)
            .and_then(|prev| self.correlated[prev].reference_at_depth(level))
            .map(Block::last_verse_range);

        let target = self.correlated[index].reference_at_depth_or_empty(level);
        target.elements = parse_verse_marked_text(text);
        let (start, end) = match target.elements.first() {
            Some(BlockElement::Verse { start, end }) => (*start, *end),
            _ => inherited.unwrap_or((target.initial_start_verse, target.initial_end_verse)),
        };
        target.initial_start_verse = start;
        target.initial_end_verse = end;

        for depth in 0..=1 {
            self.propagate_verse(index, depth);
        }
        Ok(())
    }

    /// Carry the verse in effect at the end of block `from`'s reference at
    /// `level` into following references that do not start a verse.
    fn propagate_verse(&mut self, from: usize, level: usize) {
        let Some(mut current) = self.correlated[from]
            .reference_at_depth(level)
            .map(Block::last_verse_range)
        else {
            return;
        };
        for block in self.correlated.iter_mut().skip(from + 1) {
            let Some(reference) = block.reference_at_depth_mut(level) else {
                break;
            };
            if reference.starts_at_verse_start() {
                break;
            }
            reference.initial_start_verse = current.0;
            reference.initial_end_verse = current.1;
            current = reference.last_verse_range();
        }
    }

    // -----------------------------------------------------------------------
    // Apply
    // -----------------------------------------------------------------------

    /// Write the window back onto `book`.
    ///
    /// Fails with [`RaError::Unmatched`] unless every Scripture block has
    /// exactly one reference block. Unclear speakers are resolved from the
    /// matched reference. When splitting added blocks, the book's range is
    /// replaced by the window; otherwise speaker, delivery, reference and
    /// confirmation are copied block by block and continuation blocks after
    /// the window follow the window's last speaker.
    pub fn apply(&mut self, book: &mut BookScript) -> Result<ApplyOutcome> {
        let unmatched = self.unmatched_indices();
        if !unmatched.is_empty() {
            return Err(RaError::Unmatched { indices: unmatched });
        }
        if book.book_number() != self.book_number
            || self.start_index + self.original_count > book.blocks().len()
        {
            return Err(RaError::InvalidInput(format!(
                "window {}+{} does not fit {}",
                self.start_index,
                self.original_count,
                book.book_id()
            )));
        }

        for block in self.correlated.iter_mut() {
            if block.character.is_unclear() {
                if let Some(reference) = block.matched_reference().cloned() {
                    block.set_character_and_delivery_from(&reference);
                }
            }
            if block.character.is_standard() {
                block.multi_block_quote = MultiBlockQuote::None;
            }
        }

        let replaced = self.blocks_added_by_splitting > 0;
        let mut continuations_updated = 0;
        if replaced {
            book.replace_blocks(self.start_index, self.original_count, self.correlated.clone())?;
            self.original_count = self.correlated.len();
            self.blocks_added_by_splitting = 0;
        } else {
            let range = self.start_index..self.start_index + self.original_count;
            let targets = &mut book.blocks_mut()[range];
            for (target, source) in targets.iter_mut().zip(&self.correlated) {
                target.character = source.character.clone();
                target.delivery = source.delivery.clone();
                target.multi_block_quote = source.multi_block_quote;
                target.reference = source.reference.clone();
                target.user_confirmed = source.user_confirmed;
            }
            continuations_updated = self.resync_continuations(book);
        }
        self.original_blocks = self.correlated.clone();

        let end = self.start_index + self.original_count + continuations_updated;
        let violations: Vec<usize> = (self.start_index..end)
            .filter(|&i| {
                let b = &book.blocks()[i];
                b.character.is_standard() && b.multi_block_quote != MultiBlockQuote::None
            })
            .collect();
        if !violations.is_empty() {
            error!(?violations, "standard character left with multi-block quote status");
            debug_assert!(violations.is_empty(), "standard character in multi-block quote");
        }

        Ok(ApplyOutcome {
            start_index: self.start_index,
            block_count: self.original_count,
            replaced,
            continuations_updated,
        })
    }

    /// Make continuation blocks following the window agree with the window's
    /// last block. Returns how many book blocks were touched.
    fn resync_continuations(&self, book: &mut BookScript) -> usize {
        let Some(last) = self.correlated.last() else {
            return 0;
        };
        let blocks = book.blocks_mut();
        let mut k = self.start_index + self.original_count;
        let mut touched = 0;
        while k < blocks.len() && blocks[k].multi_block_quote == MultiBlockQuote::Continuation {
            if last.character.is_standard() || last.multi_block_quote == MultiBlockQuote::None {
                let continues = blocks
                    .get(k + 1)
                    .is_some_and(|b| b.multi_block_quote == MultiBlockQuote::Continuation);
                blocks[k].multi_block_quote = if continues && !blocks[k].character.is_standard() {
                    MultiBlockQuote::Start
                } else {
                    MultiBlockQuote::None
                };
                touched += 1;
                break;
            }
            blocks[k].character = last.character.clone();
            blocks[k].delivery = last.delivery.clone();
            blocks[k].user_confirmed = last.user_confirmed;
            touched += 1;
            k += 1;
        }
        touched
    }
}

/// Index range (inclusive) of the verse group containing `anchor`.
fn verse_group<F>(blocks: &[Block], anchor: usize, can_break_before: F) -> (usize, usize)
where
    F: Fn(&Block) -> bool,
{
    let mut start = anchor;
    loop {
        while start > 0
            && !blocks[start].starts_at_verse_start()
            && !blocks[start].is_chapter_announcement()
            && !blocks[start - 1].is_chapter_announcement()
        {
            start -= 1;
        }
        let at_boundary = start == 0
            || blocks[start].is_chapter_announcement()
            || blocks[start - 1].is_chapter_announcement()
            || !blocks[start].starts_at_verse_start();
        if at_boundary || can_break_before(&blocks[start]) {
            break;
        }
        start -= 1;
    }

    let mut last = advance_to_clean_verse_break(blocks, start, |b| can_break_before(b));
    while last > start && !blocks[last].is_scripture() {
        last -= 1;
    }
    (start, last)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
