//! Per-request context and the stage-chain state machine.
//!
//! A [`Context`] walks its stage list with a cursor:
//!
//! ```text
//! ready (cursor = 0) ──next()──▶ running (0 < cursor ≤ len) ──▶ done (cursor = len)
//!                                        │
//!                                        └──abort()──▶ done
//! ```
//!
//! [`Context::next`] is a loop, not a recursion: it keeps taking the stage at
//! the cursor, advancing, and calling it until the list is exhausted. That
//! loop is what makes every stage "call next" automatically once it returns.
//! A stage that wants before/after behaviour calls `next()` itself; the rest
//! of the chain then runs inside that call, and the outer loop finds nothing
//! left to do.
//!
//! Contexts are pooled. [`Context::reset`] is the only way a context moves on
//! to a new request, and it clears everything the previous one left behind.

use std::mem;
use std::net::IpAddr;
use std::sync::Arc;

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::StatusCode;
use serde::Serialize;
use tracing::{error, warn};

use crate::form::{Form, FormError};
use crate::handler::Stage;
use crate::options::Options;
use crate::request::Request;
use crate::response::{ContentType, Response, reason};

/// Header set by Google App Engine's front end.
const APPENGINE_REMOTE_ADDR: &str = "x-appengine-remote-addr";

pub struct Context {
    options: Arc<Options>,
    request: Request,
    response: Response,
    stages: Arc<[Stage]>,
    cursor: usize,
    form: Option<Form>,
}

impl Context {
    pub fn new(options: Arc<Options>) -> Self {
        Self {
            options,
            request: Request::default(),
            response: Response::default(),
            stages: Arc::from([]),
            cursor: 0,
            form: None,
        }
    }

    /// Prepares the context for a new request. Called once per checkout,
    /// before the stage list is installed.
    pub fn reset(&mut self, request: Request, response: Response) {
        self.request = request;
        self.response = response;
        self.stages = Arc::from([]);
        self.cursor = 0;
        self.form = None;
    }

    /// Installs the chain for this request. Must follow [`reset`](Context::reset).
    pub fn set_stages(&mut self, stages: Arc<[Stage]>) {
        debug_assert!(self.cursor == 0 && self.stages.is_empty(), "stages set twice");
        self.stages = stages;
    }

    // ── chain control ────────────────────────────────────────────────────────

    /// Runs the remaining stages in order. A no-op once the chain is done.
    pub fn next(&mut self) {
        while self.cursor < self.stages.len() {
            let stage = Arc::clone(&self.stages[self.cursor]);
            self.cursor += 1;
            stage(self);
        }
    }

    /// Ends the chain: no further stage runs for this request.
    pub fn abort(&mut self) {
        self.cursor = self.stages.len();
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.stages.len()
    }

    /// `(cursor, chain length)`.
    #[cfg(test)]
    pub(crate) fn position(&self) -> (usize, usize) {
        (self.cursor, self.stages.len())
    }

    // ── response ─────────────────────────────────────────────────────────────

    /// Writes `body` as `text/html`.
    pub fn string(&mut self, status: StatusCode, body: impl AsRef<str>) {
        self.send(status, ContentType::Html, body.as_ref().as_bytes());
    }

    /// Writes `value` as JSON. Serialisation failures are logged and answered
    /// with `500 Internal Server Error`.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => self.send(status, ContentType::Json, &body),
            Err(e) => {
                error!(path = self.request.path(), "json encoding failed: {e}");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                self.send(status, ContentType::Text, reason(status).as_bytes());
            }
        }
    }

    pub fn bytes(&mut self, status: StatusCode, content_type: ContentType, body: &[u8]) {
        self.send(status, content_type, body);
    }

    /// Appends raw bytes to the body, implying `200 OK` if no status was written.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response.write_status(StatusCode::OK);
        self.response.write(bytes);
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn response(&self) -> &Response { &self.response }

    /// Sets a response header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.response.headers_mut().insert(name, value);
            }
            _ => error!(name, "invalid response header dropped"),
        }
    }

    pub(crate) fn take_response(&mut self) -> Response {
        mem::take(&mut self.response)
    }

    fn send(&mut self, status: StatusCode, content_type: ContentType, body: &[u8]) {
        if self.response.write_status(status) {
            self.response.content_type(content_type);
        } else {
            warn!(
                path = self.request.path(),
                sent = self.response.status().as_u16(),
                ignored = status.as_u16(),
                "superfluous status write"
            );
        }
        self.response.write(body);
    }

    // ── request ──────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn options(&self) -> &Options { &self.options }
    pub fn method(&self) -> &http::Method { self.request.method() }
    pub fn path(&self) -> &str { self.request.path() }
    pub fn body(&self) -> &[u8] { self.request.body() }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// First value of query parameter `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        let query = self.request.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// First value of post-form field `key`.
    pub fn post(&mut self, key: &str) -> Option<String> {
        self.form().first(key).map(str::to_owned)
    }

    /// Every value of post-form field `key`, in body order.
    pub fn post_array(&mut self, key: &str) -> Vec<String> {
        self.form().all(key).into_iter().map(str::to_owned).collect()
    }

    /// Parses the body on first use. A body that is not a form, or fails to
    /// parse, leaves the form empty.
    fn form(&mut self) -> &Form {
        let request = &self.request;
        self.form.get_or_insert_with(|| {
            match Form::parse(request.header(CONTENT_TYPE.as_str()), request.body()) {
                Ok(form) => form,
                Err(FormError::Unsupported) => Form::default(),
                Err(e) => {
                    warn!(path = request.path(), "post form ignored: {e}");
                    Form::default()
                }
            }
        })
    }

    /// Client address: `X-Forwarded-For` (first entry), `X-Real-Ip`,
    /// `X-Appengine-Remote-Addr`, then the socket peer. Candidates that do not
    /// parse as an IP are skipped. Empty when nothing qualifies.
    pub fn ip(&self) -> String {
        let forwarded = self
            .request
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next());
        [
            forwarded,
            self.request.header("x-real-ip"),
            self.request.header(APPENGINE_REMOTE_ADDR),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| candidate.parse::<IpAddr>().is_ok())
        .map(str::to_owned)
        .or_else(|| self.request.remote_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
    }
}
