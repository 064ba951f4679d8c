//! Tracing helpers shared by the engine and the binary

mod error_ext;

pub use error_ext::{ErrorTraceExt, ResultTraceExt};
