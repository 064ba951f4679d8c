//! Process entry: logging setup and the stdio request loop

mod protocol;
mod runner;

pub use protocol::{ErrorObject, Request, Response, dispatch, handle_line};
pub use runner::{run_with_cli, serve, shutdown_otel};
