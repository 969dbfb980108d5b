//! greet-server: a line-oriented TCP greeting server
//!
//! Every accepted connection gets the same treatment: the server waits a
//! fixed delay, reads one newline-terminated line, logs it, writes back
//! `Hello TCP Client! I received a message from you!` and closes.
//!
//! Features:
//! - Sequential serving (one client at a time, arrival order)
//! - Opt-in concurrent serving, one task per connection
//! - Explicit start/stop lifecycle for embedding and tests
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;

pub use config::{Config, ServeMode};
pub use error::{ClientError, ConnectionError, ServerError};
pub use handler::{handle_connection, Exchange, DEFAULT_DELAY, RESPONSE};
pub use server::{Server, ServerHandle, ShutdownHandle};
