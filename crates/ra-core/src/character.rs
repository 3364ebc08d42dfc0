use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// StandardCharacter
// ---------------------------------------------------------------------------

/// The non-dramatic "characters" every book has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardCharacter {
    Narrator,
    /// Book titles and chapter announcements.
    BookOrChapter,
    /// Section heads and other editorial material.
    ExtraBiblical,
    Intro,
}

impl StandardCharacter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardCharacter::Narrator => "narrator",
            StandardCharacter::BookOrChapter => "book_or_chapter",
            StandardCharacter::ExtraBiblical => "extra_biblical",
            StandardCharacter::Intro => "intro",
        }
    }
}

// ---------------------------------------------------------------------------
// Character
// ---------------------------------------------------------------------------

/// Who speaks a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Character {
    /// A named speaking character, e.g. `"Jesus"`.
    Known(String),
    Standard(StandardCharacter),
    /// The quote parser found more than one plausible speaker.
    Ambiguous,
    /// The quote parser found a quote where none was expected.
    Unexpected,
    /// A human has flagged the block for another look.
    NeedsReview,
}

impl Character {
    pub fn known(id: impl Into<String>) -> Self {
        Character::Known(id.into())
    }

    pub fn narrator() -> Self {
        Character::Standard(StandardCharacter::Narrator)
    }

    pub fn standard_type(&self) -> Option<StandardCharacter> {
        match self {
            Character::Standard(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, Character::Standard(_))
    }

    pub fn is_narrator(&self) -> bool {
        matches!(self, Character::Standard(StandardCharacter::Narrator))
    }

    /// `true` for the standard characters whose text is not Scripture.
    pub fn is_extra_biblical(&self) -> bool {
        matches!(
            self,
            Character::Standard(
                StandardCharacter::BookOrChapter
                    | StandardCharacter::ExtraBiblical
                    | StandardCharacter::Intro
            )
        )
    }

    /// `true` when the quote parser could not settle on a speaker.
    pub fn is_unclear(&self) -> bool {
        matches!(self, Character::Ambiguous | Character::Unexpected)
    }

    /// Whether a vernacular block spoken by `self` may be paired with a
    /// reference block spoken by `reference`.
    pub fn is_compatible_with(&self, reference: &Character) -> bool {
        self == reference || (self.is_unclear() && !reference.is_standard())
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Character::Known(id) => f.write_str(id),
            Character::Standard(kind) => f.write_str(kind.as_str()),
            Character::Ambiguous => f.write_str("Ambiguous"),
            Character::Unexpected => f.write_str("Unexpected"),
            Character::NeedsReview => f.write_str("Needs Review"),
        }
    }
}

// ---------------------------------------------------------------------------
// MultiBlockQuote
// ---------------------------------------------------------------------------

/// Position of a block within a quote that spans several blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiBlockQuote {
    #[default]
    None,
    Start,
    Continuation,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclear_vernacular_is_compatible_with_named_reference_only() {
        assert!(Character::Ambiguous.is_compatible_with(&Character::known("Jesus")));
        assert!(Character::Unexpected.is_compatible_with(&Character::known("Peter")));
        assert!(!Character::Ambiguous.is_compatible_with(&Character::narrator()));
        assert!(!Character::NeedsReview.is_compatible_with(&Character::known("Jesus")));
    }

    #[test]
    fn same_character_is_compatible() {
        assert!(Character::narrator().is_compatible_with(&Character::narrator()));
        assert!(Character::known("Jesus").is_compatible_with(&Character::known("Jesus")));
        assert!(!Character::known("Jesus").is_compatible_with(&Character::known("Peter")));
    }

    #[test]
    fn extra_biblical_excludes_narrator() {
        assert!(!Character::narrator().is_extra_biblical());
        assert!(Character::Standard(StandardCharacter::ExtraBiblical).is_extra_biblical());
        assert!(Character::Standard(StandardCharacter::BookOrChapter).is_extra_biblical());
        assert!(!Character::known("Jesus").is_extra_biblical());
    }

    #[test]
    fn character_serializes_as_tagged_union() {
        assert_eq!(
            serde_json::to_string(&Character::known("Jesus")).unwrap(),
            r#"{"kind":"known","id":"Jesus"}"#
        );
        assert_eq!(
            serde_json::to_string(&Character::Ambiguous).unwrap(),
            r#"{"kind":"ambiguous"}"#
        );
        assert_eq!(
            serde_json::to_string(&Character::narrator()).unwrap(),
            r#"{"kind":"standard","id":"narrator"}"#
        );
    }
}
