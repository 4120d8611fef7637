//! Line index and line-ending scanning.

pub mod line_index;
pub mod scanner;

pub use line_index::LineIndex;
pub use scanner::LineEnding;
