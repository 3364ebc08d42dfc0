//! Block-to-reference aligner.
//!
//! Walks a vernacular block sequence and a reference block sequence of the
//! same book in lock-step. Blocks are grouped into verse chunks (runs of
//! blocks between two clean verse breaks) and each chunk is resolved by the
//! first rule that applies:
//!
//! 1. **Single vernacular block**: it gets the combination of every
//!    reference block in the chunk, provided both start at the same verse.
//! 2. **Two blocks across a bridge**: two vernacular blocks with distinct
//!    speakers, one of them spanning a verse bridge, each get the reference
//!    blocks spoken by their own character.
//! 3. **Top-down pairing**: blocks are paired from the start while verse
//!    range and speaker agree. Reference blocks left over at the last
//!    vernacular block are combined or offered as candidates.
//! 4. **Both ends**: pairing from the end as well; the residue in the middle
//!    is attached to a compatible neighbour, split at a verse boundary, or
//!    left as unmatched candidates.
//!
//! A block counts as matched only when exactly one reference block is
//! attached. Reference blocks are never reordered.

use tracing::debug;

use ra_core::{
    advance_to_clean_verse_break, Block, ReferenceLanguageInfo, StandardCharacter, VerseRef,
    Versification,
};

use crate::result::{AlignOptions, AlignReport};
use crate::split::try_split_at_verse_end;

/// A request from chunk resolution to split reference block `ref_index`
/// (index into the full reference sequence) after `verse`.
#[derive(Debug, Clone, Copy)]
struct SplitRequest {
    ref_index: usize,
    verse: u32,
}

// ---------------------------------------------------------------------------
// Aligner
// ---------------------------------------------------------------------------

/// Aligns the blocks of one book against a reference text.
pub struct Aligner<'a> {
    book: u8,
    vern_versification: &'a Versification,
    ref_versification: &'a Versification,
    language: &'a ReferenceLanguageInfo,
    options: AlignOptions,
}

impl<'a> Aligner<'a> {
    pub fn new(
        book: u8,
        vern_versification: &'a Versification,
        ref_versification: &'a Versification,
        language: &'a ReferenceLanguageInfo,
    ) -> Self {
        Self {
            book,
            vern_versification,
            ref_versification,
            language,
            options: AlignOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AlignOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach reference blocks to every block of `vern`.
    ///
    /// Blocks that already match a reference block are left alone. `refs` is
    /// only modified when a reference block has to be split at a verse
    /// boundary; [`AlignReport::ref_blocks_split`] counts those splits.
    pub fn align(&self, vern: &mut [Block], refs: &mut Vec<Block>) -> AlignReport {
        let mut report = AlignReport::default();
        let mut i_ref = 0;
        let mut ref_memory: Option<usize> = None;
        let mut i_vern = 0;

        while i_vern < vern.len() {
            if vern[i_vern].matches_reference_text() {
                if !self.is_relocated(&vern[i_vern]) {
                    if let Some(memory) = ref_memory.take() {
                        i_ref = memory;
                    }
                    self.skip_claimed(&vern[i_vern], refs, &mut i_ref);
                }
                i_vern += 1;
                continue;
            }

            match vern[i_vern].character.standard_type() {
                Some(StandardCharacter::BookOrChapter) => {
                    self.align_book_or_chapter(&mut vern[i_vern], refs, &mut i_ref);
                    i_vern += 1;
                    continue;
                }
                Some(StandardCharacter::ExtraBiblical) => {
                    if let Some(r) = refs
                        .get(i_ref)
                        .filter(|r| r.character == vern[i_vern].character)
                    {
                        vern[i_vern].set_matched_reference_block(r.clone());
                        i_ref += 1;
                    }
                    i_vern += 1;
                    continue;
                }
                Some(StandardCharacter::Intro) => {
                    i_vern += 1;
                    continue;
                }
                _ => {}
            }

            let start = self.vern_start(&vern[i_vern]);

            // Verses some versifications place elsewhere in the book are
            // looked up out of order; the cursor rejoins once they are done.
            if self.is_relocated(&vern[i_vern]) {
                if ref_memory.is_none() {
                    ref_memory = Some(i_ref);
                    i_ref = refs
                        .iter()
                        .position(|r| r.is_scripture() && r.end_ref(self.book) >= start)
                        .unwrap_or(refs.len());
                }
            } else if let Some(memory) = ref_memory.take() {
                i_ref = memory;
            }

            while refs
                .get(i_ref)
                .is_some_and(|r| !r.is_scripture() || r.end_ref(self.book) < start)
            {
                i_ref += 1;
            }

            if i_ref >= refs.len() {
                if let Some(memory) = ref_memory.take() {
                    debug!(verse = %start, "no reference text for relocated verse");
                    i_ref = memory;
                    self.no_reference(&mut vern[i_vern]);
                    i_vern += 1;
                    continue;
                }
                debug!(
                    book = self.book,
                    remaining = vern.len() - i_vern,
                    "reference text exhausted before vernacular text"
                );
                report.stopped_early = true;
                break;
            }

            // The reference text has no counterpart for this block.
            if refs[i_ref].start_ref(self.book) > self.vern_end(&vern[i_vern]) {
                self.no_reference(&mut vern[i_vern]);
                i_vern += 1;
                continue;
            }

            let (vern_last, mut ref_last) = self.chunk_extent(vern, i_vern, refs, i_ref);
            let mut allow_split = self.options.allow_splitting;
            loop {
                let vern_idx = scripture_indices_in(vern, i_vern, vern_last);
                let ref_idx = scripture_indices_in(refs, i_ref, ref_last);
                let Some(request) = self.resolve_chunk(vern, &vern_idx, refs, &ref_idx, allow_split)
                else {
                    break;
                };
                if try_split_at_verse_end(refs, request.ref_index, request.verse) {
                    debug!(
                        chapter = refs[request.ref_index].chapter,
                        verse = request.verse,
                        "split reference block to align"
                    );
                    report.ref_blocks_split += 1;
                    ref_last += 1;
                } else {
                    allow_split = false;
                }
            }

            i_vern = vern_last + 1;
            i_ref = ref_last + 1;
        }

        if self.options.force_match {
            for block in vern.iter_mut() {
                if block.is_scripture() && !block.matches_reference_text() {
                    let candidates: Vec<&Block> = block.reference_blocks().iter().collect();
                    match Block::combine(candidates) {
                        Some(combined) => block.set_matched_reference_block(combined),
                        None => block.set_matched_reference_block(block.empty_reference()),
                    }
                }
            }
        }

        report.tally(vern)
    }

    // -----------------------------------------------------------------------
    // Verse references
    // -----------------------------------------------------------------------

    fn to_ref_versification(&self, vref: VerseRef) -> VerseRef {
        self.vern_versification
            .convert(vref, self.ref_versification)
    }

    fn vern_start(&self, block: &Block) -> VerseRef {
        self.to_ref_versification(block.start_ref(self.book))
    }

    fn vern_end(&self, block: &Block) -> VerseRef {
        self.to_ref_versification(block.end_ref(self.book))
    }

    /// `true` when the reference versification puts the block's first verse
    /// in another chapter.
    fn is_relocated(&self, block: &Block) -> bool {
        block.is_scripture() && self.vern_start(block).chapter != block.chapter
    }

    /// Same start, same end, compatible speaker.
    fn blocks_match(&self, vern: &Block, reference: &Block) -> bool {
        self.vern_start(vern) == reference.start_ref(self.book)
            && self.vern_end(vern) == reference.end_ref(self.book)
            && vern.character.is_compatible_with(&reference.character)
    }

    // -----------------------------------------------------------------------
    // Structural blocks
    // -----------------------------------------------------------------------

    /// Match a book title or chapter announcement to the reference block of
    /// the same kind. Only a match at the cursor advances it; a match found
    /// further ahead is cloned and the cursor held for the content that
    /// follows.
    fn align_book_or_chapter(&self, block: &mut Block, refs: &[Block], i_ref: &mut usize) {
        let corresponds = |r: &Block| {
            r.character == block.character
                && r.style_tag == block.style_tag
                && r.chapter == block.chapter
        };
        let at_cursor = refs.get(*i_ref).is_some_and(|r| corresponds(r));
        let found = if at_cursor {
            Some(*i_ref)
        } else {
            refs.iter()
                .skip(*i_ref)
                .position(|r| corresponds(r))
                .map(|offset| *i_ref + offset)
        };

        match found {
            Some(k) => {
                block.set_matched_reference_block(refs[k].clone());
                if at_cursor {
                    *i_ref += 1;
                }
            }
            None if block.is_chapter_announcement() => {
                let chapter = block.chapter;
                let mut synthesized =
                    Block::chapter_announcement(chapter, self.language.chapter_announcement(chapter));
                if let Some(backing) = &self.language.backing {
                    synthesized.set_matched_reference_block(Block::chapter_announcement(
                        chapter,
                        backing.chapter_announcement(chapter),
                    ));
                }
                block.set_matched_reference_block(synthesized);
            }
            None => self.no_reference(block),
        }
    }

    /// Move the cursor past the reference blocks an already matched block
    /// accounts for, so a later block of the same verse does not claim them
    /// again. Reference blocks count as claimed while they lie inside the
    /// matched block's verse range and their text occurs, in order, in the
    /// matched text.
    fn skip_claimed(&self, block: &Block, refs: &[Block], i_ref: &mut usize) {
        let Some(reference) = block.matched_reference() else {
            return;
        };
        if !block.is_scripture() {
            if refs.get(*i_ref) == Some(reference) {
                *i_ref += 1;
            }
            return;
        }

        let start = reference.start_ref(self.book);
        let end = reference.end_ref(self.book);
        let mut k = *i_ref;
        while refs
            .get(k)
            .is_some_and(|r| !r.is_scripture() || r.end_ref(self.book) < start)
        {
            k += 1;
        }

        let matched_text = reference.text();
        let mut rest = matched_text.as_str();
        while let Some(r) = refs.get(k) {
            if !r.is_scripture() {
                k += 1;
                continue;
            }
            if r.start_ref(self.book) < start || r.end_ref(self.book) > end {
                break;
            }
            let text = r.text();
            let text = text.trim();
            match rest.find(text) {
                Some(pos) if !text.is_empty() => rest = &rest[pos + text.len()..],
                _ => break,
            }
            k += 1;
            *i_ref = k;
        }
    }

    // -----------------------------------------------------------------------
    // Chunking
    // -----------------------------------------------------------------------

    /// Last vernacular and last reference index of the chunk starting at
    /// `i_vern` / `i_ref`. The vernacular side grows while the reference
    /// side runs past it.
    fn chunk_extent(&self, vern: &[Block], i_vern: usize, refs: &[Block], i_ref: usize) -> (usize, usize) {
        let mut vern_last = vern_chunk_end(vern, i_vern);
        loop {
            let last_vern_verse = self.vern_end(&vern[vern_last]);
            let ref_last = self.ref_chunk_end(refs, i_ref, last_vern_verse);
            if refs[ref_last].end_ref(self.book) <= last_vern_verse {
                return (vern_last, ref_last);
            }
            let next = (vern_last + 1..vern.len())
                .take_while(|&k| !vern[k].is_chapter_announcement())
                .find(|&k| vern[k].is_scripture());
            match next.map(|k| vern_chunk_end(vern, k)) {
                Some(extended) if extended > vern_last => vern_last = extended,
                _ => return (vern_last, ref_last),
            }
        }
    }

    fn ref_chunk_end(&self, refs: &[Block], i_ref: usize, last_vern_verse: VerseRef) -> usize {
        let mut last = i_ref;
        for (k, r) in refs.iter().enumerate().skip(i_ref + 1) {
            if r.is_chapter_announcement() {
                break;
            }
            if !r.is_scripture() {
                continue;
            }
            if r.starts_at_verse_start() && r.start_ref(self.book) > last_vern_verse {
                break;
            }
            last = k;
        }
        last
    }

    // -----------------------------------------------------------------------
    // Chunk resolution
    // -----------------------------------------------------------------------

    /// Resolve one chunk. Returns a split request, before touching any block,
    /// when splitting a reference block would let the chunk resolve more
    /// precisely.
    fn resolve_chunk(
        &self,
        vern: &mut [Block],
        vern_idx: &[usize],
        refs: &[Block],
        ref_idx: &[usize],
        allow_split: bool,
    ) -> Option<SplitRequest> {
        let n_v = vern_idx.len();
        let n_r = ref_idx.len();
        if n_v == 0 {
            return None;
        }
        if n_r == 0 {
            for &k in vern_idx {
                self.no_reference(&mut vern[k]);
            }
            return None;
        }
        let chunk_refs: Vec<&Block> = ref_idx.iter().map(|&k| &refs[k]).collect();

        if n_v == 1 {
            let block = &mut vern[vern_idx[0]];
            // The rest of a verse whose opening block is already matched.
            let resumes_verse = !block.starts_at_verse_start();
            if resumes_verse && !(n_r == 1 && self.blocks_match(block, chunk_refs[0])) {
                self.leftover(block, &chunk_refs);
            } else if self.vern_start(block) == chunk_refs[0].start_ref(self.book) {
                assign_combined(block, &chunk_refs);
            } else {
                self.leftover(block, &chunk_refs);
            }
            return None;
        }

        if n_v == 2 && n_r > 2 && self.split_bridge_by_character(vern, vern_idx, &chunk_refs) {
            return None;
        }

        let top = (0..n_v.min(n_r))
            .take_while(|&k| self.blocks_match(&vern[vern_idx[k]], chunk_refs[k]))
            .count();

        if top == n_v && top == n_r {
            for k in 0..n_v {
                vern[vern_idx[k]].set_matched_reference_block(chunk_refs[k].clone());
            }
            return None;
        }

        if top == n_v - 1 && n_r > top {
            for k in 0..top {
                vern[vern_idx[k]].set_matched_reference_block(chunk_refs[k].clone());
            }
            if !self.attach_trailing_reference_to_previous(vern, vern_idx, &chunk_refs, top) {
                self.leftover(&mut vern[vern_idx[top]], &chunk_refs[top..]);
            }
            return None;
        }

        let bottom = (0..(n_v - top).min(n_r - top))
            .take_while(|&k| self.blocks_match(&vern[vern_idx[n_v - 1 - k]], chunk_refs[n_r - 1 - k]))
            .count();
        let residual_vern = &vern_idx[top..n_v - bottom];
        let residual_refs = &chunk_refs[top..n_r - bottom];

        if allow_split && residual_vern.len() >= 2 && residual_refs.len() == 1 {
            let reference = residual_refs[0];
            for &k in &residual_vern[1..] {
                let start = self.vern_start(&vern[k]);
                let inside = start.chapter == reference.chapter
                    && start.verse > reference.initial_start_verse
                    && start.verse <= reference.last_verse_num();
                if inside && !reference.has_bridge_spanning(start.verse - 1) {
                    return Some(SplitRequest {
                        ref_index: ref_idx[top],
                        verse: start.verse - 1,
                    });
                }
            }
        }

        for k in 0..top {
            vern[vern_idx[k]].set_matched_reference_block(chunk_refs[k].clone());
        }
        for k in 0..bottom {
            vern[vern_idx[n_v - 1 - k]].set_matched_reference_block(chunk_refs[n_r - 1 - k].clone());
        }

        match (residual_vern.len(), residual_refs.len()) {
            (0, 0) => {}
            (0, _) => {
                let previous = top.checked_sub(1).map(|k| vern_idx[k]);
                let next = (bottom > 0).then(|| vern_idx[n_v - bottom]);
                self.attach_to_neighbour(vern, previous, next, residual_refs);
            }
            (_, 0) => {
                for &k in residual_vern {
                    self.no_reference(&mut vern[k]);
                }
            }
            (1, _) => self.leftover(&mut vern[residual_vern[0]], residual_refs),
            _ if self.options.force_match => {
                assign_combined(&mut vern[residual_vern[0]], residual_refs);
                for &k in &residual_vern[1..] {
                    let empty = vern[k].empty_reference();
                    vern[k].set_matched_reference_block(empty);
                }
            }
            _ => {
                for &k in residual_vern {
                    vern[k].set_unmatched_reference_blocks(
                        residual_refs.iter().map(|r| (*r).clone()).collect(),
                    );
                }
            }
        }
        None
    }

    /// Two vernacular blocks with distinct clear speakers, at least one of
    /// them a verse bridge, against reference blocks spoken by exactly those
    /// two characters: each block gets its own character's reference text.
    fn split_bridge_by_character(&self, vern: &mut [Block], vern_idx: &[usize], refs: &[&Block]) -> bool {
        let (first, second) = (&vern[vern_idx[0]], &vern[vern_idx[1]]);
        if first.character == second.character
            || first.character.is_unclear()
            || second.character.is_unclear()
            || !(first.has_verse_bridge() || second.has_verse_bridge())
        {
            return false;
        }
        let mut speakers = Vec::new();
        for r in refs {
            if !speakers.contains(&&r.character) {
                speakers.push(&r.character);
            }
        }
        if speakers.len() != 2
            || !speakers.contains(&&first.character)
            || !speakers.contains(&&second.character)
        {
            return false;
        }

        for &k in &vern_idx[..2] {
            let own: Vec<&Block> = refs
                .iter()
                .copied()
                .filter(|r| r.character == vern[k].character)
                .collect();
            assign_combined(&mut vern[k], &own);
        }
        true
    }

    /// Handles a vernacular narrator tag that trails the quote where the
    /// reference has it leading: with exactly two reference blocks left for
    /// the last vernacular block, the trailing one goes to the previous block
    /// when it shares that block's reference speaker and ends where the last
    /// vernacular block ends.
    fn attach_trailing_reference_to_previous(
        &self,
        vern: &mut [Block],
        vern_idx: &[usize],
        refs: &[&Block],
        top: usize,
    ) -> bool {
        let n_r = refs.len();
        if top == 0 || n_r - top != 2 {
            return false;
        }
        let previous = &vern[vern_idx[top - 1]];
        let last = &vern[vern_idx[top]];
        let current = refs[top];
        let trailing = refs[n_r - 1];

        let fits = trailing.character == refs[top - 1].character
            && previous.character.is_compatible_with(&trailing.character)
            && last.character.is_compatible_with(&current.character)
            && self.vern_start(last) == current.start_ref(self.book)
            && self.vern_end(last) == trailing.end_ref(self.book);
        if !fits {
            return false;
        }

        vern[vern_idx[top]].set_matched_reference_block(current.clone());
        assign_combined(&mut vern[vern_idx[top - 1]], &[refs[top - 1], trailing]);
        true
    }

    /// Reference blocks with no vernacular counterpart of their own join the
    /// match of a neighbouring block, preferring the previous one.
    fn attach_to_neighbour(
        &self,
        vern: &mut [Block],
        previous: Option<usize>,
        next: Option<usize>,
        residual: &[&Block],
    ) {
        let compatible = |k: &usize| {
            residual
                .iter()
                .all(|r| vern[*k].character.is_compatible_with(&r.character))
        };
        let target = previous
            .filter(compatible)
            .map(|k| (k, true))
            .or_else(|| next.filter(compatible).map(|k| (k, false)));
        let fallback = previous
            .map(|k| (k, true))
            .or_else(|| next.map(|k| (k, false)));
        let Some((k, after_own)) = target.or(fallback) else {
            return;
        };

        if target.is_none() && !self.options.force_match {
            vern[k].append_unmatched_reference_blocks(residual.iter().map(|r| (*r).clone()));
            return;
        }
        let own = vern[k].reference_blocks().to_vec();
        let mut ordered: Vec<&Block> = Vec::with_capacity(own.len() + residual.len());
        if after_own {
            ordered.extend(own.iter());
            ordered.extend(residual.iter().copied());
        } else {
            ordered.extend(residual.iter().copied());
            ordered.extend(own.iter());
        }
        assign_combined(&mut vern[k], &ordered);
    }

    /// More reference blocks than the vernacular block can take one-to-one.
    fn leftover(&self, block: &mut Block, refs: &[&Block]) {
        if self.options.force_match {
            assign_combined(block, refs);
        } else {
            block.set_unmatched_reference_blocks(refs.iter().map(|r| (*r).clone()).collect());
        }
    }

    /// No reference block corresponds to `block`.
    fn no_reference(&self, block: &mut Block) {
        if self.options.force_match && block.is_scripture() {
            let empty = block.empty_reference();
            block.set_matched_reference_block(empty);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn assign_combined(block: &mut Block, refs: &[&Block]) {
    if let Some(combined) = Block::combine(refs.iter().copied()) {
        block.set_matched_reference_block(combined);
    }
}

/// End of the vernacular chunk starting at `from`, excluding trailing
/// non-Scripture blocks.
fn vern_chunk_end(vern: &[Block], from: usize) -> usize {
    let mut last = advance_to_clean_verse_break(vern, from, |_| true);
    while last > from && !vern[last].is_scripture() {
        last -= 1;
    }
    last
}

fn scripture_indices_in(blocks: &[Block], first: usize, last: usize) -> Vec<usize> {
    (first..=last).filter(|&k| blocks[k].is_scripture()).collect()
}

/// Align `vern` against `refs` with the given options. See [`Aligner`].
pub fn align_blocks(
    vern: &mut [Block],
    refs: &mut Vec<Block>,
    book: u8,
    vern_versification: &Versification,
    ref_versification: &Versification,
    language: &ReferenceLanguageInfo,
    options: AlignOptions,
) -> AlignReport {
    Aligner::new(book, vern_versification, ref_versification, language)
        .with_options(options)
        .align(vern, refs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ra_core::{book_number, Character, StandardCharacter};

    fn mat() -> u8 {
        book_number("MAT").unwrap()
    }

    fn block(chapter: u32, verse: u32, text: &str, character: Character) -> Block {
        Block::new("p", chapter, verse, verse)
            .with_verse(verse)
            .with_text(text)
            .with_character(character)
    }

    fn continuation(chapter: u32, verse: u32, text: &str, character: Character) -> Block {
        Block::new("p", chapter, verse, verse)
            .with_text(text)
            .with_character(character)
            .continuing_paragraph()
    }

    fn align(vern: &mut [Block], refs: &mut Vec<Block>, options: AlignOptions) -> AlignReport {
        let english = Versification::english();
        let language = ReferenceLanguageInfo::default();
        align_blocks(vern, refs, mat(), &english, &english, &language, options)
    }

    #[test]
    fn one_to_one_blocks_match() {
        let mut vern = vec![
            block(1, 1, "Uno.", Character::narrator()),
            block(1, 2, "Dos.", Character::narrator()),
        ];
        let mut refs = vec![
            block(1, 1, "One.", Character::narrator()),
            block(1, 2, "Two.", Character::narrator()),
        ];
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(report.matched, 2);
        assert!(report.is_complete());
        assert_eq!(vern[1].reference_text_at_depth(0), "{2}Two.");
    }

    #[test]
    fn single_block_spanning_two_verses_gets_combined_reference() {
        let mut vern = vec![Block::new("p", 1, 5, 5)
            .with_verse(5)
            .with_text("Cinco. ")
            .with_verse(6)
            .with_text("Seis.")];
        let mut refs = vec![
            block(1, 5, "Five. ", Character::narrator()),
            block(1, 6, "Six.", Character::narrator()),
        ];
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(report.matched, 1);
        assert!(vern[0].matches_reference_text());
        assert_eq!(vern[0].reference_text_at_depth(0), "{5}Five. {6}Six.");
    }

    #[test]
    fn two_speakers_in_one_reference_verse_without_split_point_stay_unresolved() {
        let mut vern = vec![
            block(1, 9, "Jesus answered,", Character::narrator()),
            continuation(1, 9, "Follow me.", Character::known("Jesus")),
        ];
        let mut refs = vec![block(1, 9, "Jesus said, Follow me.", Character::narrator())];
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(report.ref_blocks_split, 0);
        assert!(vern[0].matches_reference_text());
        assert!(!vern[1].matches_reference_text());
        assert_eq!(report.unmatched, 1);
    }

    #[test]
    fn reference_block_is_split_at_verse_where_second_block_starts() {
        let mut vern = vec![
            block(1, 9, "Jesus answered them:", Character::Ambiguous),
            block(1, 10, "Follow me.", Character::known("Jesus")),
        ];
        let mut refs = vec![Block::new("p", 1, 9, 9)
            .with_verse(9)
            .with_text("Answer. ")
            .with_verse(10)
            .with_text("Follow.")
            .with_character(Character::known("Jesus"))];
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(report.ref_blocks_split, 1);
        assert_eq!(refs.len(), 2);
        assert!(vern.iter().all(Block::matches_reference_text));
        assert_eq!(vern[0].reference_text_at_depth(0), "{9}Answer. ");
        assert_eq!(vern[1].reference_text_at_depth(0), "{10}Follow.");
    }

    #[test]
    fn ambiguous_block_matches_named_reference_without_confirming() {
        let mut vern = vec![block(1, 3, "¿Quién es?", Character::Ambiguous)];
        let mut refs = vec![block(1, 3, "Who is it?", Character::known("Jesus"))];
        align(&mut vern, &mut refs, AlignOptions::default());
        assert!(vern[0].matches_reference_text());
        assert_eq!(vern[0].character, Character::Ambiguous);
        assert!(!vern[0].user_confirmed);

        let reference = vern[0].matched_reference().unwrap().clone();
        vern[0].set_character_and_delivery_from(&reference);
        assert_eq!(vern[0].character, Character::known("Jesus"));
        assert!(vern[0].user_confirmed);
    }

    #[test]
    fn mismatched_middle_is_left_as_candidates() {
        let mut vern = vec![
            block(1, 4, "Narration.", Character::narrator()),
            continuation(1, 4, "Peter speaks.", Character::known("Peter")),
            continuation(1, 4, "John speaks.", Character::known("John")),
            continuation(1, 4, "More narration.", Character::narrator()),
        ];
        let mut refs = vec![
            block(1, 4, "Narration.", Character::narrator()),
            continuation(1, 4, "Both disciples speak.", Character::known("disciples")),
            continuation(1, 4, "More narration.", Character::narrator()),
        ];
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert!(vern[0].matches_reference_text());
        assert!(vern[3].matches_reference_text());
        assert_eq!(vern[1].reference_blocks().len(), 1);
        assert!(!vern[1].matches_reference_text());
        assert_eq!(report.unmatched, 2);
    }

    #[test]
    fn force_match_resolves_every_scripture_block() {
        let mut vern = vec![
            Block::chapter_announcement(1, "Capítulo 1"),
            block(1, 1, "A.", Character::narrator()),
            continuation(1, 1, "B.", Character::known("Peter")),
            continuation(1, 1, "C.", Character::known("John")),
            block(1, 2, "Extra verse.", Character::narrator()),
            block(1, 3, "Past the end.", Character::narrator()),
        ];
        let mut refs = vec![
            block(1, 1, "a", Character::narrator()),
            continuation(1, 1, "bc", Character::known("disciples")),
        ];
        let report = align(&mut vern, &mut refs, AlignOptions::forced());
        assert!(report.stopped_early);
        assert!(vern
            .iter()
            .filter(|b| b.is_scripture())
            .all(|b| b.matches_reference_text() && b.reference_blocks().len() == 1));
        assert!(report.is_complete());
    }

    #[test]
    fn already_matched_sequence_is_unchanged() {
        let mut vern = vec![
            block(1, 1, "Uno.", Character::narrator()),
            block(1, 2, "Dos.", Character::known("Jesus")),
        ];
        let mut refs = vec![
            block(1, 1, "One.", Character::narrator()),
            block(1, 2, "Two.", Character::known("Jesus")),
        ];
        align(&mut vern, &mut refs, AlignOptions::default());
        let vern_before = vern.clone();
        let refs_before = refs.clone();
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(vern, vern_before);
        assert_eq!(refs, refs_before);
        assert_eq!(report.ref_blocks_split, 0);
    }

    #[test]
    fn realigning_partly_matched_verse_leaves_unresolved_block_unmatched() {
        let mut vern = vec![
            block(1, 4, "Narración.", Character::narrator()),
            continuation(1, 4, "Habla Pedro.", Character::known("Peter")),
        ];
        let mut refs = vec![
            block(1, 4, "Narration.", Character::narrator()),
            continuation(1, 4, "Both speak.", Character::known("disciples")),
            continuation(1, 4, "he said.", Character::narrator()),
        ];
        align(&mut vern, &mut refs, AlignOptions::default());
        assert!(vern[0].matches_reference_text());
        assert!(!vern[1].matches_reference_text());
        assert_eq!(vern[1].reference_blocks().len(), 2);
        let vern_before = vern.clone();

        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(vern, vern_before);
        assert_eq!(vern[0].reference_text_at_depth(0), "{4}Narration.");
        assert!(!vern[1].matches_reference_text());
        assert_eq!(report.unmatched, 1);
    }

    #[test]
    fn matched_block_claims_its_reference_before_next_verse() {
        let mut vern = vec![
            block(1, 1, "Uno.", Character::narrator()),
            block(1, 2, "Dos.", Character::narrator()),
        ];
        let mut refs = vec![
            block(1, 1, "One.", Character::narrator()),
            block(1, 2, "Two.", Character::narrator()),
        ];
        vern[0].set_matched_reference_block(refs[0].clone());
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(report.matched, 2);
        assert_eq!(vern[1].reference_text_at_depth(0), "{2}Two.");
    }

    fn rom() -> u8 {
        book_number("ROM").unwrap()
    }

    /// Vernacular table that numbers the closing doxology of Romans as
    /// 14:24, where English has it at 16:25.
    fn doxology_at_14() -> Versification {
        Versification::new("Doxology at 14")
            .with_mapping(VerseRef::new(rom(), 14, 24), VerseRef::new(rom(), 16, 25))
    }

    fn align_romans(vern: &mut [Block], refs: &mut Vec<Block>) -> AlignReport {
        let language = ReferenceLanguageInfo::default();
        align_blocks(
            vern,
            refs,
            rom(),
            &doxology_at_14(),
            &Versification::english(),
            &language,
            AlignOptions::default(),
        )
    }

    #[test]
    fn relocated_verse_gets_reference_from_other_chapter() {
        let mut vern = vec![
            block(14, 23, "Veintitrés.", Character::narrator()),
            block(14, 24, "Doxología.", Character::narrator()),
            block(15, 1, "Uno.", Character::narrator()),
        ];
        let mut refs = vec![
            block(14, 23, "Twenty-three.", Character::narrator()),
            block(15, 1, "One.", Character::narrator()),
            block(16, 25, "Doxology.", Character::narrator()),
        ];
        let report = align_romans(&mut vern, &mut refs);
        assert!(report.is_complete());
        assert_eq!(vern[0].reference_text_at_depth(0), "{23}Twenty-three.");
        assert_eq!(vern[1].reference_text_at_depth(0), "{25}Doxology.");
        assert_eq!(vern[1].matched_reference().unwrap().chapter, 16);
        assert_eq!(vern[2].reference_text_at_depth(0), "{1}One.");

        let vern_before = vern.clone();
        align_romans(&mut vern, &mut refs);
        assert_eq!(vern, vern_before);
    }

    #[test]
    fn relocated_verse_without_reference_text_is_left_unmatched() {
        let mut vern = vec![
            block(14, 23, "Veintitrés.", Character::narrator()),
            block(14, 24, "Doxología.", Character::narrator()),
            block(15, 1, "Uno.", Character::narrator()),
        ];
        let mut refs = vec![
            block(14, 23, "Twenty-three.", Character::narrator()),
            block(15, 1, "One.", Character::narrator()),
        ];
        let report = align_romans(&mut vern, &mut refs);
        assert!(!report.stopped_early);
        assert!(vern[1].reference_blocks().is_empty());
        assert_eq!(vern[2].reference_text_at_depth(0), "{1}One.");
        assert_eq!(report.unmatched, 1);
    }

    #[test]
    fn missing_chapter_announcement_is_synthesized() {
        let language = ReferenceLanguageInfo::default()
            .with_backing(ReferenceLanguageInfo {
                chapter_label: "Chapitre".into(),
                ..ReferenceLanguageInfo::default()
            });
        let english = Versification::english();
        let mut vern = vec![
            Block::chapter_announcement(2, "Capítulo 2"),
            block(2, 1, "Uno.", Character::narrator()),
        ];
        let mut refs = vec![block(2, 1, "One.", Character::narrator())];
        align_blocks(&mut vern, &mut refs, mat(), &english, &english, &language, AlignOptions::default());
        assert_eq!(vern[0].reference_text_at_depth(0), "Chapter 2");
        assert_eq!(vern[0].reference_text_at_depth(1), "Chapitre 2");
        assert!(vern[1].matches_reference_text());
    }

    #[test]
    fn chapter_announcement_found_ahead_does_not_consume_cursor() {
        let heading = Character::Standard(StandardCharacter::ExtraBiblical);
        let mut vern = vec![
            Block::chapter_announcement(1, "Capítulo 1"),
            block(1, 1, "Uno.", Character::narrator()),
        ];
        let mut refs = vec![
            Block::new("s", 1, 0, 0).with_text("Heading").with_character(heading),
            Block::chapter_announcement(1, "Chapter 1"),
            block(1, 1, "One.", Character::narrator()),
        ];
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(vern[0].reference_text_at_depth(0), "Chapter 1");
        assert_eq!(report.matched, 1);
    }

    #[test]
    fn bridge_split_by_character() {
        let mut vern = vec![
            Block::new("p", 1, 7, 8)
                .with_verse_bridge(7, 8)
                .with_text("Y dijo Jesús:")
                .with_character(Character::narrator()),
            continuation(1, 8, "Venid.", Character::known("Jesus")),
        ];
        let mut refs = vec![
            block(1, 7, "Then ", Character::narrator()),
            continuation(1, 7, "Come.", Character::known("Jesus")),
            block(1, 8, "he said to them.", Character::narrator()),
        ];
        align(&mut vern, &mut refs, AlignOptions::default());
        assert_eq!(vern[0].reference_text_at_depth(0), "{7}Then {8}he said to them.");
        assert_eq!(vern[1].reference_text_at_depth(0), "Come.");
    }

    #[test]
    fn vernacular_extra_verse_gets_no_reference() {
        let mut vern = vec![
            block(1, 1, "Uno.", Character::narrator()),
            block(1, 2, "Dos.", Character::narrator()),
            block(1, 3, "Tres.", Character::narrator()),
        ];
        let mut refs = vec![
            block(1, 1, "One.", Character::narrator()),
            block(1, 3, "Three.", Character::narrator()),
        ];
        let report = align(&mut vern, &mut refs, AlignOptions::default());
        assert!(vern[0].matches_reference_text());
        assert!(vern[1].reference_blocks().is_empty());
        assert!(vern[2].matches_reference_text());
        assert_eq!(report.unmatched, 1);
    }
}
