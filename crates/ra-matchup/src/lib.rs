pub mod matchup;
pub mod narrator;

pub use matchup::{ApplyOutcome, BlockMatchup};
pub use narrator::{NarratorTagInsertion, NarratorTagOutcome, NarratorTagTarget};
