pub mod block;
pub mod book;
pub mod character;
pub mod db;
pub mod error;
pub mod language;
pub mod schema;
pub mod verse;

pub use block::*;
pub use book::*;
pub use character::*;
pub use error::*;
pub use language::*;
pub use verse::*;
