//! Stock narrator phrases for reference text that is missing.
//!
//! Vernacular texts often name the speaker ("Jesus said:") where the
//! reference text simply starts the quote. Recording scripts read better
//! when the reference side carries a placeholder such as "he said.", so the
//! editor can insert one into any narrator block whose reference text is
//! empty.

use serde::{Deserialize, Serialize};
use tracing::debug;

use ra_core::{Block, BlockElement, Character, MultiBlockQuote, RaError, ReferenceLink, Result};

use crate::matchup::BlockMatchup;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which window blocks [`BlockMatchup::insert_narrator_tag`] considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarratorTagTarget {
    Block(usize),
    All,
}

/// One phrase written into a reference block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarratorTagInsertion {
    /// Window index of the vernacular block.
    pub block_index: usize,
    /// Reference level written to (0 is the primary reference text).
    pub level: usize,
    /// The literal text inserted, separator included.
    pub text: String,
}

/// What [`BlockMatchup::insert_narrator_tag`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarratorTagOutcome {
    /// Number of phrases written, across all reference levels.
    pub inserted: usize,
    /// A continuation block was handed to the narrator for lack of any
    /// better evidence.
    pub reassignment_guessed: bool,
}

// ---------------------------------------------------------------------------
// Insertion
// ---------------------------------------------------------------------------

impl BlockMatchup {
    /// Insert the reference language's narrator phrase into every empty
    /// reference level of the targeted narrator or unclear blocks.
    ///
    /// Blocks holding several unmatched candidates are skipped. A block whose
    /// speaker was unclear becomes the narrator's, and any continuation
    /// blocks of its quote take the speaker of their own reference block
    /// (or the narrator, which counts as a guess).
    pub fn insert_narrator_tag<F>(
        &mut self,
        target: NarratorTagTarget,
        mut on_inserted: F,
    ) -> Result<NarratorTagOutcome>
    where
        F: FnMut(&NarratorTagInsertion),
    {
        let language = self.language().clone();
        let levels: Vec<_> = std::iter::once(&language)
            .chain(language.backing.as_deref())
            .enumerate()
            .collect();
        let blocks = self.correlated_blocks_mut();

        let indices = match target {
            NarratorTagTarget::Block(i) if i >= blocks.len() => {
                return Err(RaError::InvalidInput(format!(
                    "block {i} outside window of {} blocks",
                    blocks.len()
                )));
            }
            NarratorTagTarget::Block(i) => i..i + 1,
            NarratorTagTarget::All => 0..blocks.len(),
        };

        let mut outcome = NarratorTagOutcome::default();
        for i in indices {
            if !is_eligible(&blocks[i]) {
                continue;
            }
            let continues_paragraph = blocks.get(i + 1).is_some_and(|b| !b.is_paragraph_start);

            let mut inserted_here = false;
            for (level, info) in &levels {
                let empty = blocks[i]
                    .reference_at_depth(*level)
                    .map_or(true, |r| r.text().trim().is_empty());
                if !empty {
                    continue;
                }
                let mut text = info.narrator_tag.clone();
                if continues_paragraph {
                    text.push_str(&info.word_separator);
                }
                let slot = blocks[i].reference_at_depth_or_empty(*level);
                slot.elements.push(BlockElement::text(text.clone()));
                slot.character = Character::narrator();

                let insertion = NarratorTagInsertion {
                    block_index: i,
                    level: *level,
                    text,
                };
                debug!(block = i, depth = *level, text = %insertion.text, "inserted narrator tag");
                on_inserted(&insertion);
                outcome.inserted += 1;
                inserted_here = true;
            }

            if inserted_here && blocks[i].character.is_unclear() {
                blocks[i].character = Character::narrator();
                blocks[i].delivery = None;
                blocks[i].multi_block_quote = MultiBlockQuote::None;
                blocks[i].user_confirmed = true;
                outcome.reassignment_guessed |= reassign_continuations(blocks, i + 1);
            }
        }
        Ok(outcome)
    }
}

fn is_eligible(block: &Block) -> bool {
    (block.character.is_narrator() || block.character.is_unclear())
        && !matches!(block.reference, ReferenceLink::Unmatched(_))
}

/// Release the continuation blocks starting at `from` from the quote they
/// belonged to. Returns `true` if any of them had to be guessed.
fn reassign_continuations(blocks: &mut [Block], from: usize) -> bool {
    let mut guessed = false;
    for block in blocks[from..]
        .iter_mut()
        .take_while(|b| b.multi_block_quote == MultiBlockQuote::Continuation)
    {
        let implied = block
            .matched_reference()
            .map(|r| r.character.clone())
            .filter(|c| !c.is_unclear());
        block.character = match implied {
            Some(character) => character,
            None => {
                guessed = true;
                Character::narrator()
            }
        };
        block.multi_block_quote = MultiBlockQuote::None;
    }
    guessed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ra_core::{BookScript, ReferenceLanguageInfo, Versification};

    fn narrator_block(verse: u32, text: &str) -> Block {
        Block::new("p", 3, verse, verse).with_verse(verse).with_text(text)
    }

    fn matchup(blocks: Vec<Block>, language: ReferenceLanguageInfo) -> BlockMatchup {
        let book = BookScript::new("JHN", Arc::new(Versification::english()), blocks).unwrap();
        BlockMatchup::build(&book, 0, |_| {}, |_| true, &language, book.blocks().len()).unwrap()
    }

    fn with_empty_reference(block: Block) -> Block {
        let mut block = block;
        let empty = block.empty_reference().with_verse(block.initial_start_verse);
        block.set_matched_reference_block(empty);
        block
    }

    #[test]
    fn empty_reference_gets_narrator_phrase() {
        let mut m = matchup(
            vec![with_empty_reference(narrator_block(12, "Jesús respondió:"))],
            ReferenceLanguageInfo::default(),
        );
        let mut reported = Vec::new();
        let outcome = m
            .insert_narrator_tag(NarratorTagTarget::Block(0), |ins| reported.push(ins.clone()))
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert!(!outcome.reassignment_guessed);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].text, "he said.");
        assert_eq!(m.correlated_blocks()[0].reference_text_at_depth(0), "{12}he said.");
    }

    #[test]
    fn separator_added_when_next_block_continues_paragraph() {
        let next = Block::new("p", 3, 12, 12)
            .with_text("Truly I tell you.")
            .with_character(Character::known("Jesus"))
            .continuing_paragraph();
        let mut m = matchup(
            vec![with_empty_reference(narrator_block(12, "Jesús respondió:")), next],
            ReferenceLanguageInfo::default(),
        );
        let mut texts = Vec::new();
        m.insert_narrator_tag(NarratorTagTarget::All, |ins| texts.push(ins.text.clone()))
            .unwrap();
        assert_eq!(texts, vec!["he said. ".to_string()]);
    }

    #[test]
    fn second_level_uses_backing_language() {
        let language = ReferenceLanguageInfo {
            language_name: "Français".into(),
            narrator_tag: "dit-il.".into(),
            ..ReferenceLanguageInfo::default()
        }
        .with_backing(ReferenceLanguageInfo::default());
        let mut m = matchup(vec![narrator_block(12, "Jesús respondió:")], language);
        let mut levels = Vec::new();
        let outcome = m
            .insert_narrator_tag(NarratorTagTarget::Block(0), |ins| {
                levels.push((ins.level, ins.text.clone()))
            })
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(
            levels,
            vec![(0, "dit-il.".to_string()), (1, "he said.".to_string())]
        );
        let block = &m.correlated_blocks()[0];
        assert_eq!(block.reference_text_at_depth(1), "he said.");
        assert!(block.matched_reference().unwrap().character.is_narrator());
    }

    #[test]
    fn existing_reference_text_is_left_alone() {
        let mut block = narrator_block(12, "Jesús respondió:");
        block.set_matched_reference_block(narrator_block(12, "Jesus answered."));
        let mut m = matchup(vec![block], ReferenceLanguageInfo::default());
        let outcome = m
            .insert_narrator_tag(NarratorTagTarget::All, |_| panic!("nothing to insert"))
            .unwrap();
        assert_eq!(outcome.inserted, 0);
    }

    #[test]
    fn quoted_and_unmatched_blocks_are_skipped() {
        let quoted = narrator_block(12, "Venid.").with_character(Character::known("Jesus"));
        let mut pending = narrator_block(13, "Y dijo:");
        pending.set_unmatched_reference_blocks(vec![
            narrator_block(13, "And"),
            narrator_block(13, "said:"),
        ]);
        let mut m = matchup(vec![quoted, pending], ReferenceLanguageInfo::default());
        let outcome = m.insert_narrator_tag(NarratorTagTarget::All, |_| {}).unwrap();
        assert_eq!(outcome.inserted, 0);
        assert!(m.insert_narrator_tag(NarratorTagTarget::Block(2), |_| {}).is_err());
    }

    #[test]
    fn unclear_block_becomes_narrator_and_releases_continuations() {
        let unclear = narrator_block(12, "Dijo:")
            .with_character(Character::Ambiguous)
            .with_multi_block_quote(MultiBlockQuote::Start);
        let mut with_own = Block::new("p", 3, 12, 12)
            .with_text("Venid.")
            .with_character(Character::Ambiguous)
            .with_multi_block_quote(MultiBlockQuote::Continuation);
        with_own.set_matched_reference_block(
            Block::new("p", 3, 12, 12)
                .with_text("Come.")
                .with_character(Character::known("Jesus")),
        );
        let without = Block::new("p", 3, 12, 12)
            .with_text("Seguidme.")
            .with_character(Character::Ambiguous)
            .with_multi_block_quote(MultiBlockQuote::Continuation);

        let mut m = matchup(vec![unclear, with_own, without], ReferenceLanguageInfo::default());
        let outcome = m.insert_narrator_tag(NarratorTagTarget::Block(0), |_| {}).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert!(outcome.reassignment_guessed);

        let blocks = m.correlated_blocks();
        assert!(blocks[0].character.is_narrator());
        assert_eq!(blocks[1].character, Character::known("Jesus"));
        assert!(blocks[2].character.is_narrator());
        assert!(blocks
            .iter()
            .all(|b| b.multi_block_quote == MultiBlockQuote::None));
    }

    #[test]
    fn target_serializes_in_snake_case() {
        let json = serde_json::to_string(&NarratorTagTarget::Block(3)).unwrap();
        assert_eq!(json, r#"{"block":3}"#);
        let all: NarratorTagTarget = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(all, NarratorTagTarget::All);
    }
}
