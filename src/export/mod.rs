//! Streaming export of a session, with optional timestamp stripping.

pub mod stream;
pub mod transform;

pub use stream::ExportStream;
pub use transform::LineTransform;
