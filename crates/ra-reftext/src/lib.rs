pub mod config;
pub mod reference_text;
pub mod registry;

pub use config::{ReferenceTextConfig, VersificationConfig};
pub use reference_text::{ReferenceText, ReferenceTextId, ReferenceTextSession};
pub use registry::ReferenceTextRegistry;
