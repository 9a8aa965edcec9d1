//! # tyrion
//!
//! A small HTTP framework built around one idea: a request is a [`Context`]
//! walking an ordered list of stages.
//!
//! - Exact-match routing on `(method, lower-cased path)`. No wildcards.
//! - Middleware is just more stages. A stage runs, the chain moves on; a
//!   stage that calls [`Context::next`] itself wraps everything after it, and
//!   [`Context::abort`] stops the chain.
//! - Contexts are pooled and reset between requests.
//! - HTTP/1.1 and HTTP/2 via hyper, optional TLS via rustls, graceful
//!   shutdown on SIGTERM / Ctrl-C, JSON access log with hourly or daily
//!   rotation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tyrion::{Context, Options, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tyrion::Error> {
//!     Server::new(Options::default())?
//!         .get("/users", (require_token, list_users))
//!         .post("/users", create_user)
//!         .run()
//!         .await
//! }
//!
//! fn require_token(c: &mut Context) {
//!     if c.get_header("authorization").is_none() {
//!         c.string(StatusCode::UNAUTHORIZED, "missing token");
//!         c.abort();
//!     }
//! }
//!
//! fn list_users(c: &mut Context) {
//!     c.json(StatusCode::OK, &["alice", "bob"]);
//! }
//!
//! fn create_user(c: &mut Context) {
//!     match c.post("name") {
//!         Some(name) => c.string(StatusCode::CREATED, name),
//!         None => c.string(StatusCode::BAD_REQUEST, "name is required"),
//!     }
//! }
//! ```

mod access_log;
mod context;
mod error;
mod form;
mod handler;
mod io;
mod method;
mod options;
mod pool;
mod request;
mod response;
mod router;
mod server;
mod tls;

pub mod config;

pub use access_log::{AccessLog, AccessRecord};
pub use context::Context;
pub use error::Error;
pub use handler::{Handler, IntoStages, Stage, stage};
pub use http::StatusCode;
pub use method::Method;
pub use options::{
    AccessLogOptions, DEFAULT_ADDR, DEFAULT_MAX_POST_MEMORY, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT, Options, Rotation,
};
pub use pool::{ContextPool, PooledContext};
pub use request::Request;
pub use response::{ContentType, Response, reason};
pub use router::Router;
pub use server::{Server, ServerHandle};
