//! Alignment options and the summary an alignment pass reports.

use serde::{Deserialize, Serialize};

use ra_core::Block;

// ---------------------------------------------------------------------------
// AlignOptions
// ---------------------------------------------------------------------------

/// Runtime options for one alignment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignOptions {
    /// Resolve every Scripture block to exactly one reference block, combining
    /// candidates or attaching an empty reference block where needed.
    /// Default: false.
    pub force_match: bool,
    /// Allow a reference block to be split at a verse boundary when that is
    /// the only way to pair it with two vernacular blocks. Default: true.
    pub allow_splitting: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            force_match: false,
            allow_splitting: true,
        }
    }
}

impl AlignOptions {
    pub fn forced() -> Self {
        Self {
            force_match: true,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// AlignReport
// ---------------------------------------------------------------------------

/// Aggregate outcome of aligning one book (or window).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignReport {
    /// Scripture blocks carrying exactly one reference block.
    pub matched: usize,
    /// Scripture blocks with zero or several candidate reference blocks.
    pub unmatched: usize,
    /// Reference blocks split in place during the pass. Non-zero means the
    /// reference book changed and must be saved again.
    pub ref_blocks_split: usize,
    /// The reference text ran out before the vernacular text did.
    pub stopped_early: bool,
}

impl AlignReport {
    /// Recount `matched` / `unmatched` over the Scripture blocks of `blocks`.
    pub(crate) fn tally(mut self, blocks: &[Block]) -> Self {
        let (matched, unmatched) = blocks
            .iter()
            .filter(|b| b.is_scripture())
            .fold((0, 0), |(m, u), b| {
                if b.matches_reference_text() {
                    (m + 1, u)
                } else {
                    (m, u + 1)
                }
            });
        self.matched = matched;
        self.unmatched = unmatched;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.unmatched == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_allow_splitting_without_forcing() {
        let options = AlignOptions::default();
        assert!(!options.force_match);
        assert!(options.allow_splitting);
        assert!(AlignOptions::forced().force_match);
    }

    #[test]
    fn report_serializes_snake_case() {
        let report = AlignReport {
            matched: 3,
            unmatched: 1,
            ref_blocks_split: 0,
            stopped_early: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ref_blocks_split"], 0);
        assert_eq!(json["stopped_early"], true);
        assert!(!report.is_complete());
    }
}
