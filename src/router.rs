//! Exact-match request router.
//!
//! One flat table keyed by `(Method, normalised path)`. No wildcards, no path
//! parameters, no trie: every path is registered verbatim and looked up with a
//! single hash probe. Build it at startup; it is shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::handler::Stage;
use crate::method::Method;

/// The route table. Values are ready-to-run stage chains.
pub struct Router {
    routes: HashMap<(Method, String), Arc<[Stage]>>,
    ignore_last_slash: bool,
}

impl Router {
    /// `ignore_last_slash` makes `/users/` and `/users` the same route.
    pub fn new(ignore_last_slash: bool) -> Self {
        Self { routes: HashMap::new(), ignore_last_slash }
    }

    /// Stores `stages` under `(method, pattern)`.
    ///
    /// A second registration for the same normalised key replaces the first.
    pub fn register(&mut self, method: Method, pattern: &str, stages: Vec<Stage>) {
        let path = self.normalize(pattern);
        if self.routes.insert((method, path), stages.into()).is_some() {
            warn!(%method, pattern, "route registered twice, keeping the last one");
        }
    }

    /// Returns the chain registered for `(method, path)`, normalising `path`
    /// the same way [`register`](Router::register) did.
    pub fn lookup(&self, method: Method, path: &str) -> Option<Arc<[Stage]>> {
        let key = (method, self.normalize(path));
        self.routes.get(&key).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn normalize(&self, path: &str) -> String {
        let mut path = path.to_lowercase();
        if self.ignore_last_slash && path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        path
    }
}

impl Default for Router {
    fn default() -> Self { Self::new(false) }
}
