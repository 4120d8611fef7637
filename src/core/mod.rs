//! The engine instance and its append/window paths.

mod append;
pub mod engine;
pub mod format;
pub(crate) mod window;

pub use engine::LogEngine;
pub use window::LogWindow;
