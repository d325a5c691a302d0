//! codepad-core — text and coordinate primitives shared by the codepad crates.
pub mod document;
pub mod error;
pub mod logging;
pub mod position;

pub use document::Document;
pub use error::CoreError;
pub use position::{Position, Range, TextChange};
