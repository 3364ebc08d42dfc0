use serde::{Deserialize, Serialize};

/// Language-specific strings a reference text contributes to alignment and
/// review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLanguageInfo {
    pub language_name: String,
    /// Stock narrator phrase inserted where a reference block has no text.
    pub narrator_tag: String,
    /// Appended after an inserted phrase when the next block continues the
    /// same paragraph.
    pub word_separator: String,
    /// Word used to announce chapters, e.g. `"Chapter"`.
    pub chapter_label: String,
    /// Language info of the secondary reference text, if this one is backed
    /// by another.
    pub backing: Option<Box<ReferenceLanguageInfo>>,
}

impl Default for ReferenceLanguageInfo {
    fn default() -> Self {
        Self {
            language_name: "English".to_string(),
            narrator_tag: "he said.".to_string(),
            word_separator: " ".to_string(),
            chapter_label: "Chapter".to_string(),
            backing: None,
        }
    }
}

impl ReferenceLanguageInfo {
    pub fn with_backing(mut self, backing: ReferenceLanguageInfo) -> Self {
        self.backing = Some(Box::new(backing));
        self
    }

    pub fn has_secondary_reference_text(&self) -> bool {
        self.backing.is_some()
    }

    pub fn chapter_announcement(&self, chapter: u32) -> String {
        format!("{} {}", self.chapter_label, chapter)
    }
}
