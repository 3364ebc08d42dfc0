use serde::{Deserialize, Serialize};

use crate::character::{Character, MultiBlockQuote, StandardCharacter};
use crate::verse::VerseRef;

/// Style tag of a chapter announcement block.
pub const CHAPTER_STYLE_TAG: &str = "c";

// ---------------------------------------------------------------------------
// BlockElement
// ---------------------------------------------------------------------------

/// One sub-element of a block's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockElement {
    /// A verse marker. `end == start` unless the marker is a bridge (`5-6`).
    Verse { start: u32, end: u32 },
    /// A run of spoken text.
    Text { text: String },
    /// A recording annotation (sound effect, pause); never spoken.
    Annotation { text: String },
}

impl BlockElement {
    pub fn verse(number: u32) -> Self {
        BlockElement::Verse {
            start: number,
            end: number,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        BlockElement::Text { text: text.into() }
    }

    fn has_spoken_text(&self) -> bool {
        matches!(self, BlockElement::Text { text } if !text.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// ReferenceLink
// ---------------------------------------------------------------------------

/// A block's link to the reference text at the next level down.
///
/// Reference blocks are owned by the block that links to them. Attaching a
/// reference block to a second owner always means attaching a clone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "blocks", rename_all = "snake_case")]
pub enum ReferenceLink {
    #[default]
    None,
    /// Exactly one corresponding reference block.
    Matched(Box<Block>),
    /// Candidate reference blocks still waiting for a human (or a forced
    /// match) to resolve them.
    Unmatched(Vec<Block>),
}

impl ReferenceLink {
    pub fn blocks(&self) -> &[Block] {
        match self {
            ReferenceLink::None => &[],
            ReferenceLink::Matched(block) => std::slice::from_ref(&**block),
            ReferenceLink::Unmatched(blocks) => blocks,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, ReferenceLink::Matched(_))
    }

    fn into_blocks(self) -> Vec<Block> {
        match self {
            ReferenceLink::None => Vec::new(),
            ReferenceLink::Matched(block) => vec![*block],
            ReferenceLink::Unmatched(blocks) => blocks,
        }
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A contiguous run of text belonging to one paragraph and verse range,
/// attributed to a single speaker.
///
/// `initial_start_verse..=initial_end_verse` is the verse (or bridge) in
/// effect where the block begins; verse 0 means the block precedes verse 1
/// (titles, chapter announcements, Psalm superscriptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub style_tag: String,
    pub chapter: u32,
    pub initial_start_verse: u32,
    pub initial_end_verse: u32,
    pub is_paragraph_start: bool,
    pub elements: Vec<BlockElement>,
    pub character: Character,
    pub delivery: Option<String>,
    pub multi_block_quote: MultiBlockQuote,
    /// Shared by every piece produced from one manual split.
    pub split_id: Option<u32>,
    pub user_confirmed: bool,
    pub reference: ReferenceLink,
}

impl Block {
    /// Construct an empty paragraph-initial block narrated by the narrator.
    pub fn new(
        style_tag: impl Into<String>,
        chapter: u32,
        initial_start_verse: u32,
        initial_end_verse: u32,
    ) -> Self {
        Self {
            style_tag: style_tag.into(),
            chapter,
            initial_start_verse,
            initial_end_verse: initial_end_verse.max(initial_start_verse),
            is_paragraph_start: true,
            elements: Vec::new(),
            character: Character::narrator(),
            delivery: None,
            multi_block_quote: MultiBlockQuote::None,
            split_id: None,
            user_confirmed: false,
            reference: ReferenceLink::None,
        }
    }

    /// A chapter announcement block for `chapter`.
    pub fn chapter_announcement(chapter: u32, text: impl Into<String>) -> Self {
        Block::new(CHAPTER_STYLE_TAG, chapter, 0, 0)
            .with_character(Character::Standard(StandardCharacter::BookOrChapter))
            .with_text(text)
    }

    pub fn with_verse(mut self, verse: u32) -> Self {
        self.push_verse(verse, verse);
        self
    }

    pub fn with_verse_bridge(mut self, start: u32, end: u32) -> Self {
        self.push_verse(start, end.max(start));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.elements.push(BlockElement::text(text));
        self
    }

    pub fn with_character(mut self, character: Character) -> Self {
        self.character = character;
        self
    }

    pub fn with_delivery(mut self, delivery: impl Into<String>) -> Self {
        self.delivery = Some(delivery.into());
        self
    }

    pub fn with_multi_block_quote(mut self, status: MultiBlockQuote) -> Self {
        self.multi_block_quote = status;
        self
    }

    pub fn continuing_paragraph(mut self) -> Self {
        self.is_paragraph_start = false;
        self
    }

    fn push_verse(&mut self, start: u32, end: u32) {
        if self.elements.is_empty() {
            self.initial_start_verse = start;
            self.initial_end_verse = end;
        }
        self.elements.push(BlockElement::Verse { start, end });
    }

    // -----------------------------------------------------------------------
    // Verse geometry
    // -----------------------------------------------------------------------

    /// End number of the last verse marker, or the initial verse range's end
    /// when the block contains no marker.
    pub fn last_verse_num(&self) -> u32 {
        self.elements
            .iter()
            .rev()
            .find_map(|e| match e {
                BlockElement::Verse { end, .. } => Some(*end),
                _ => None,
            })
            .unwrap_or(self.initial_end_verse)
    }

    /// Verse (or bridge) in effect at the end of the block.
    pub fn last_verse_range(&self) -> (u32, u32) {
        self.elements
            .iter()
            .rev()
            .find_map(|e| match e {
                BlockElement::Verse { start, end } => Some((*start, *end)),
                _ => None,
            })
            .unwrap_or((self.initial_start_verse, self.initial_end_verse))
    }

    pub fn covers_verse(&self, verse: u32) -> bool {
        self.initial_start_verse <= verse && verse <= self.last_verse_num()
    }

    pub fn covers_more_than_one_verse(&self) -> bool {
        self.last_verse_num() > self.initial_start_verse
    }

    pub fn starts_at_verse_start(&self) -> bool {
        matches!(self.elements.first(), Some(BlockElement::Verse { .. }))
    }

    /// `true` when the boundary after `verse` falls inside a verse bridge of
    /// this block, so no split is possible there.
    pub fn has_bridge_spanning(&self, verse: u32) -> bool {
        let initial_bridge = !self.starts_at_verse_start()
            && self.initial_start_verse <= verse
            && verse < self.initial_end_verse;
        initial_bridge
            || self.elements.iter().any(|e| {
                matches!(e, BlockElement::Verse { start, end } if *start <= verse && verse < *end)
            })
    }

    pub fn has_verse_bridge(&self) -> bool {
        self.initial_end_verse > self.initial_start_verse
            || self
                .elements
                .iter()
                .any(|e| matches!(e, BlockElement::Verse { start, end } if end > start))
    }

    pub fn start_ref(&self, book: u8) -> VerseRef {
        VerseRef::new(book, self.chapter, self.initial_start_verse)
    }

    pub fn initial_end_ref(&self, book: u8) -> VerseRef {
        VerseRef::new(book, self.chapter, self.initial_end_verse)
    }

    pub fn end_ref(&self, book: u8) -> VerseRef {
        VerseRef::new(book, self.chapter, self.last_verse_num())
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    pub fn is_chapter_announcement(&self) -> bool {
        self.style_tag == CHAPTER_STYLE_TAG
            && self.character == Character::Standard(StandardCharacter::BookOrChapter)
    }

    pub fn is_scripture(&self) -> bool {
        !self.character.is_extra_biblical()
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    /// Spoken text without verse numbers.
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .filter_map(|e| match e {
                BlockElement::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Spoken text with verse markers written as `{5}` / `{5-6}`; the inverse
    /// of [`parse_verse_marked_text`].
    pub fn text_with_verse_numbers(&self) -> String {
        let mut out = String::new();
        for element in &self.elements {
            match element {
                BlockElement::Verse { start, end } if start == end => {
                    out.push_str(&format!("{{{start}}}"))
                }
                BlockElement::Verse { start, end } => out.push_str(&format!("{{{start}-{end}}}")),
                BlockElement::Text { text } => out.push_str(text),
                BlockElement::Annotation { .. } => {}
            }
        }
        out
    }

    fn append_elements(&mut self, elements: &[BlockElement]) {
        for element in elements {
            match (self.elements.last_mut(), element) {
                (Some(BlockElement::Text { text: existing }), BlockElement::Text { text }) => {
                    let needs_space = !existing.is_empty()
                        && !existing.ends_with(char::is_whitespace)
                        && !text.starts_with(char::is_whitespace);
                    if needs_space {
                        existing.push(' ');
                    }
                    existing.push_str(text);
                }
                _ => self.elements.push(element.clone()),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reference links
    // -----------------------------------------------------------------------

    /// `true` once exactly one reference block is attached as a match.
    pub fn matches_reference_text(&self) -> bool {
        self.reference.is_matched()
    }

    pub fn matched_reference(&self) -> Option<&Block> {
        match &self.reference {
            ReferenceLink::Matched(block) => Some(block),
            _ => None,
        }
    }

    pub fn matched_reference_mut(&mut self) -> Option<&mut Block> {
        match &mut self.reference {
            ReferenceLink::Matched(block) => Some(block),
            _ => None,
        }
    }

    pub fn reference_blocks(&self) -> &[Block] {
        self.reference.blocks()
    }

    pub fn set_matched_reference_block(&mut self, reference: Block) {
        self.reference = ReferenceLink::Matched(Box::new(reference));
    }

    pub fn set_unmatched_reference_blocks(&mut self, candidates: Vec<Block>) {
        self.reference = if candidates.is_empty() {
            ReferenceLink::None
        } else {
            ReferenceLink::Unmatched(candidates)
        };
    }

    /// Add `extra` to whatever is attached, leaving the block unmatched.
    pub fn append_unmatched_reference_blocks(&mut self, extra: impl IntoIterator<Item = Block>) {
        let mut candidates = std::mem::take(&mut self.reference).into_blocks();
        candidates.extend(extra);
        self.set_unmatched_reference_blocks(candidates);
    }

    pub fn clear_reference_text(&mut self) {
        self.reference = ReferenceLink::None;
    }

    /// The matched reference block `level` links down the chain (level 0 is
    /// the primary reference text).
    pub fn reference_at_depth(&self, level: usize) -> Option<&Block> {
        let primary = self.matched_reference()?;
        match level {
            0 => Some(primary),
            _ => primary.reference_at_depth(level - 1),
        }
    }

    pub fn reference_at_depth_mut(&mut self, level: usize) -> Option<&mut Block> {
        let primary = self.matched_reference_mut()?;
        match level {
            0 => Some(primary),
            _ => primary.reference_at_depth_mut(level - 1),
        }
    }

    /// The matched reference block, attaching an empty one first if the
    /// block is not matched. Unmatched candidates are discarded.
    pub fn matched_reference_or_empty(&mut self) -> &mut Block {
        if !self.matches_reference_text() {
            self.reference = ReferenceLink::Matched(Box::new(self.empty_reference()));
        }
        match &mut self.reference {
            ReferenceLink::Matched(block) => block,
            ReferenceLink::None | ReferenceLink::Unmatched(_) => {
                unreachable!("reference link was just set to a match")
            }
        }
    }

    /// Like [`Block::reference_at_depth_mut`], creating empty reference
    /// blocks down to `level` as needed.
    pub fn reference_at_depth_or_empty(&mut self, level: usize) -> &mut Block {
        let primary = self.matched_reference_or_empty();
        match level {
            0 => primary,
            _ => primary.reference_at_depth_or_empty(level - 1),
        }
    }

    /// Text (with verse numbers) of the matched reference at `level`, or an
    /// empty string when there is none.
    pub fn reference_text_at_depth(&self, level: usize) -> String {
        self.reference_at_depth(level)
            .map(Block::text_with_verse_numbers)
            .unwrap_or_default()
    }

    /// An empty reference block standing in for missing reference text.
    pub fn empty_reference(&self) -> Block {
        let mut empty = Block::new(
            self.style_tag.clone(),
            self.chapter,
            self.initial_start_verse,
            self.initial_end_verse,
        );
        empty.character = self.character.clone();
        empty.delivery = self.delivery.clone();
        empty.is_paragraph_start = self.is_paragraph_start;
        empty
    }

    /// Adopt the speaker and delivery of `reference` and mark the decision as
    /// confirmed. A reference block whose own speaker is unclear is ignored.
    pub fn set_character_and_delivery_from(&mut self, reference: &Block) {
        if reference.character.is_unclear() {
            return;
        }
        self.character = reference.character.clone();
        self.delivery = reference.delivery.clone();
        self.user_confirmed = true;
        if self.character.is_standard() {
            self.multi_block_quote = MultiBlockQuote::None;
        }
    }

    // -----------------------------------------------------------------------
    // Combining and splitting
    // -----------------------------------------------------------------------

    /// Concatenate `blocks` into one block, keeping the first block's verse
    /// and style information.
    ///
    /// Speakers that disagree combine to [`Character::Ambiguous`]; reference
    /// chains are combined level by level while every block is matched, and
    /// otherwise pooled as unmatched candidates.
    pub fn combine<'a, I>(blocks: I) -> Option<Block>
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let all: Vec<&Block> = blocks.into_iter().collect();
        let (first, rest) = all.split_first()?;
        let mut combined = (*first).clone();
        if rest.is_empty() {
            return Some(combined);
        }
        for block in rest {
            combined.append_elements(&block.elements);
        }
        if rest.iter().any(|b| b.character != first.character) {
            combined.character = Character::Ambiguous;
        }
        if rest.iter().any(|b| b.delivery != first.delivery) {
            combined.delivery = None;
        }
        combined.user_confirmed = all.iter().all(|b| b.user_confirmed);
        if combined.character.is_standard() {
            combined.multi_block_quote = MultiBlockQuote::None;
        }
        combined.reference = if all.iter().all(|b| b.matches_reference_text()) {
            let chain: Vec<&Block> = all.iter().filter_map(|b| b.matched_reference()).collect();
            Block::combine(chain)
                .map(|b| ReferenceLink::Matched(Box::new(b)))
                .unwrap_or_default()
        } else {
            let pooled: Vec<Block> = all
                .iter()
                .flat_map(|b| b.reference_blocks().iter().cloned())
                .collect();
            if pooled.is_empty() {
                ReferenceLink::None
            } else {
                ReferenceLink::Unmatched(pooled)
            }
        };
        Some(combined)
    }

    /// Split this block immediately after `verse`, returning the new trailing
    /// block.
    ///
    /// Returns `None` (leaving the block untouched) unless `verse` lies
    /// strictly inside the block's verse range, a verse marker for
    /// `verse + 1` exists, and there is spoken text on both sides of it. A
    /// matched reference block is split at the same verse when it can be.
    pub fn split_after_verse(&mut self, verse: u32) -> Option<Block> {
        if verse < self.initial_start_verse || verse >= self.last_verse_num() {
            return None;
        }
        let at = self
            .elements
            .iter()
            .position(|e| matches!(e, BlockElement::Verse { start, .. } if *start == verse + 1))?;
        let text_before = self.elements[..at].iter().any(BlockElement::has_spoken_text);
        let text_after = self.elements[at + 1..]
            .iter()
            .any(BlockElement::has_spoken_text);
        if !text_before || !text_after {
            return None;
        }

        let tail = self.elements.split_off(at);
        let (start, end) = match tail[0] {
            BlockElement::Verse { start, end } => (start, end),
            _ => unreachable!("split position is always a verse marker"),
        };
        let mut new_block = Block {
            style_tag: self.style_tag.clone(),
            chapter: self.chapter,
            initial_start_verse: start,
            initial_end_verse: end,
            is_paragraph_start: false,
            elements: tail,
            character: self.character.clone(),
            delivery: self.delivery.clone(),
            multi_block_quote: MultiBlockQuote::None,
            split_id: self.split_id,
            user_confirmed: self.user_confirmed,
            reference: ReferenceLink::None,
        };

        if !self.character.is_standard() {
            if self.multi_block_quote == MultiBlockQuote::None {
                self.multi_block_quote = MultiBlockQuote::Start;
            }
            new_block.multi_block_quote = MultiBlockQuote::Continuation;
        }

        if let Some(reference) = self.matched_reference_mut() {
            if let Some(reference_tail) = reference.split_after_verse(verse) {
                new_block.set_matched_reference_block(reference_tail);
            }
        }
        Some(new_block)
    }
}

// ---------------------------------------------------------------------------
// Verse-marked text
// ---------------------------------------------------------------------------

/// Parse user-entered text in which verse markers are written `{5}` or
/// `{5-6}`. Braces that do not hold a verse number are kept as text.
pub fn parse_verse_marked_text(text: &str) -> Vec<BlockElement> {
    let mut elements = Vec::new();
    let mut pending = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        let marker = rest[open + 1..]
            .find('}')
            .and_then(|close| parse_verse_number(&rest[open + 1..open + 1 + close]).map(|v| (close, v)));
        match marker {
            Some((close, (start, end))) => {
                pending.push_str(&rest[..open]);
                if !pending.is_empty() {
                    elements.push(BlockElement::text(std::mem::take(&mut pending)));
                }
                elements.push(BlockElement::Verse { start, end });
                rest = &rest[open + close + 2..];
            }
            None => {
                pending.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
            }
        }
    }
    pending.push_str(rest);
    if !pending.is_empty() {
        elements.push(BlockElement::text(pending));
    }
    elements
}

fn parse_verse_number(s: &str) -> Option<(u32, u32)> {
    match s.split_once('-') {
        Some((start, end)) => {
            let start: u32 = start.trim().parse().ok()?;
            let end: u32 = end.trim().parse().ok()?;
            (end >= start).then_some((start, end))
        }
        None => s.trim().parse().ok().map(|v| (v, v)),
    }
}

/// The first verse marker in `elements`.
pub fn first_verse_marker(elements: &[BlockElement]) -> Option<(u32, u32)> {
    elements.iter().find_map(|e| match e {
        BlockElement::Verse { start, end } => Some((*start, *end)),
        _ => None,
    })
}

/// Indices of the Scripture blocks in `blocks`.
pub fn scripture_indices(blocks: &[Block]) -> Vec<usize> {
    blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_scripture())
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
