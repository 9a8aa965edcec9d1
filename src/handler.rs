//! Stage type and handler erasure.
//!
//! # How stages are stored
//!
//! The router holds chains built from *different* closure and function
//! types, so every handler is erased into one trait object:
//!
//! ```text
//! fn hello(c: &mut Context) { … }              ← user writes this
//!        ↓ server.get("/hello", hello)
//! hello.into_stages()                          ← IntoStages blanket impl
//!        ↓
//! vec![Arc::new(hello) as Stage]               ← one Arc per stage
//!        ↓  stored as Arc<[Stage]> under (Method, path)
//! stage(&mut ctx)  at request time             ← one vtable call per stage
//! ```
//!
//! Stages return nothing. They mutate the [`Context`] to produce a response
//! and may call [`Context::next`] or [`Context::abort`] to steer the chain.

use std::sync::Arc;

use crate::context::Context;

/// One step of a route's execution chain.
pub type Stage = Arc<dyn Fn(&mut Context) + Send + Sync + 'static>;

/// Implemented for every valid stage function.
///
/// Satisfied automatically by any `Fn(&mut Context) + Send + Sync + 'static`.
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_stage(self) -> Stage;
}

mod private {
    pub trait Sealed {}
}

impl<F> private::Sealed for F where F: Fn(&mut Context) + Send + Sync + 'static {}

impl<F> Handler for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn into_stage(self) -> Stage {
        Arc::new(self)
    }
}

/// Wraps a single handler into a [`Stage`].
pub fn stage(handler: impl Handler) -> Stage {
    handler.into_stage()
}

// ── Stage lists ───────────────────────────────────────────────────────────────

/// Anything a registration method accepts as a chain: a single handler, a
/// tuple of up to six handlers run left to right, or a prepared `Vec<Stage>`.
pub trait IntoStages {
    fn into_stages(self) -> Vec<Stage>;
}

impl<F> IntoStages for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn into_stages(self) -> Vec<Stage> {
        vec![self.into_stage()]
    }
}

impl IntoStages for Vec<Stage> {
    fn into_stages(self) -> Vec<Stage> {
        self
    }
}

macro_rules! impl_into_stages_for_tuple {
    ($($ty:ident),+) => {
        impl<$($ty),+> IntoStages for ($($ty,)+)
        where
            $($ty: Handler,)+
        {
            #[allow(non_snake_case)]
            fn into_stages(self) -> Vec<Stage> {
                let ($($ty,)+) = self;
                vec![$($ty.into_stage()),+]
            }
        }
    };
}

impl_into_stages_for_tuple!(A);
impl_into_stages_for_tuple!(A, B);
impl_into_stages_for_tuple!(A, B, C);
impl_into_stages_for_tuple!(A, B, C, D);
impl_into_stages_for_tuple!(A, B, C, D, E);
impl_into_stages_for_tuple!(A, B, C, D, E, G);
