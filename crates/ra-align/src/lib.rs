pub mod align;
pub mod result;
pub mod split;

pub use align::{align_blocks, Aligner};
pub use result::*;
pub use split::{apply_splits_to_align, try_split_at_verse_end, verse_split_locations, VerseSplitLocation};
