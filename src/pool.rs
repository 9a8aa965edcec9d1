//! Free list of request contexts.
//!
//! [`ContextPool::acquire`] hands out a [`PooledContext`] that owns its
//! context outright until it is dropped, at which point the context goes back
//! on the free list. Returning happens in `Drop`, so every exit path of a
//! request releases its context. Released contexts are cleared first, so an
//! idle context never holds a previous request body. A context dropped while
//! its thread is panicking is discarded instead of returned.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use crate::context::Context;
use crate::options::Options;
use crate::request::Request;
use crate::response::Response;

/// Contexts kept for reuse beyond this many are dropped on release.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

pub struct ContextPool {
    free: Mutex<Vec<Context>>,
    options: Arc<Options>,
    capacity: usize,
}

impl ContextPool {
    pub fn new(options: Arc<Options>, capacity: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), options, capacity }
    }

    /// Takes a context off the free list, or builds one when the list is empty.
    /// The caller must [`reset`](Context::reset) it before use.
    pub fn acquire(self: &Arc<Self>) -> PooledContext {
        let reused = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let ctx = reused.unwrap_or_else(|| Context::new(Arc::clone(&self.options)));
        PooledContext { ctx: Some(ctx), pool: Arc::clone(self) }
    }

    /// Number of idle contexts.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, mut ctx: Context) {
        ctx.reset(Request::default(), Response::default());
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(ctx);
        }
    }
}

/// A checked-out context. Exclusively owned until dropped.
pub struct PooledContext {
    ctx: Option<Context>,
    pool: Arc<ContextPool>,
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        // Only `Drop` takes the context out.
        self.ctx.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        let Some(ctx) = self.ctx.take() else { return };
        if std::thread::panicking() {
            return;
        }
        self.pool.release(ctx);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;
    use http::{StatusCode, Uri};

    use super::*;
    use crate::handler::stage;

    fn pool(capacity: usize) -> Arc<ContextPool> {
        Arc::new(ContextPool::new(Arc::new(Options::default().resolved()), capacity))
    }

    #[test]
    fn released_context_is_reused_clean() {
        let pool = pool(4);
        {
            let mut ctx = pool.acquire();
            ctx.reset(Request::new(http::Method::GET, Uri::from_static("/a")), Response::new());
            ctx.set_stages(vec![stage(|c: &mut Context| c.string(StatusCode::OK, "a"))].into());
            ctx.next();
            assert!(ctx.is_done());
        }
        assert_eq!(pool.idle(), 1);

        let mut ctx = pool.acquire();
        assert_eq!(pool.idle(), 0);
        ctx.reset(Request::new(http::Method::GET, Uri::from_static("/b")), Response::new());
        assert_eq!(ctx.position(), (0, 0));
        assert!(ctx.response().body().is_empty());
        assert!(!ctx.response().is_written());
    }

    #[test]
    fn concurrent_checkouts_are_distinct() {
        let pool = pool(4);
        let a = pool.acquire();
        let b = pool.acquire();
        assert!(!std::ptr::eq(&*a, &*b));
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn capacity_bounds_the_free_list() {
        let pool = pool(1);
        let held: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        drop(held);
        assert_eq!(pool.idle(), 1);
    }

    /// Body bytes that flag when their buffer is freed.
    struct TrackedBody {
        data: Vec<u8>,
        freed: Arc<AtomicBool>,
    }

    impl AsRef<[u8]> for TrackedBody {
        fn as_ref(&self) -> &[u8] {
            &self.data
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.freed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn idle_contexts_drop_the_previous_body() {
        let pool = pool(4);
        let freed = Arc::new(AtomicBool::new(false));
        let body = Bytes::from_owner(TrackedBody {
            data: vec![0u8; 8 << 20],
            freed: Arc::clone(&freed),
        });
        {
            let mut ctx = pool.acquire();
            let request = Request::new(http::Method::POST, Uri::from_static("/upload")).with_body(body);
            ctx.reset(request, Response::new());
            ctx.set_stages(vec![stage(|c: &mut Context| c.string(StatusCode::OK, "ok"))].into());
            ctx.next();
            let _ = ctx.take_response();
        }
        assert_eq!(pool.idle(), 1);
        assert!(freed.load(Ordering::SeqCst));
    }

    #[test]
    fn context_of_a_panicking_stage_is_not_reused() {
        let pool = pool(4);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = pool.acquire();
            ctx.reset(Request::new(http::Method::GET, Uri::from_static("/boom")), Response::new());
            ctx.set_stages(vec![stage(|_: &mut Context| panic!("stage failed"))].into());
            ctx.next();
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle(), 0);
    }
}
