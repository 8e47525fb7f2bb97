//! Procedure and middleware callables.
//!
//! Both wrap the same shape: a shared function that borrows the [`Context`]
//! mutably for as long as its future runs. Sync closures are lifted into
//! already-completed futures.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::context::Context;

type HandlerFn = dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync;

/// A named procedure body.
#[derive(Clone)]
pub struct Procedure(Arc<HandlerFn>);

/// A step run against every dispatched call before its procedure.
///
/// Identity is the allocation: clones compare equal, separately built
/// middleware never do, even from the same closure.
#[derive(Clone)]
pub struct Middleware(Arc<HandlerFn>);

macro_rules! handler_impl {
    ($ty:ident) => {
        impl $ty {
            /// Wrap an async body: `|ctx| Box::pin(async move { ... })`.
            pub fn new<F>(f: F) -> Self
            where
                F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
            {
                Self(Arc::new(f))
            }

            /// Wrap a body that completes without suspending.
            pub fn sync<F>(f: F) -> Self
            where
                F: Fn(&mut Context) + Send + Sync + 'static,
            {
                Self::new(move |ctx| {
                    f(ctx);
                    Box::pin(std::future::ready(()))
                })
            }

            /// Run against `ctx`, awaiting completion.
            pub async fn call(&self, ctx: &mut Context) {
                (self.0)(ctx).await
            }

            /// Whether both handles point at the same instance.
            pub fn same(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($ty))
                    .field(&Arc::as_ptr(&self.0))
                    .finish()
            }
        }
    };
}

handler_impl!(Procedure);
handler_impl!(Middleware);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_and_async_bodies_mutate_context() {
        let sync = Procedure::sync(|ctx| ctx.response.body.push_str("a"));
        let suspending = Procedure::new(|ctx| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                ctx.response.body.push_str("b");
            })
        });

        let mut ctx = Context::default();
        sync.call(&mut ctx).await;
        suspending.call(&mut ctx).await;
        assert_eq!(ctx.response.body, "ab");
    }

    #[test]
    fn identity_follows_allocation() {
        let a = Middleware::sync(|_| {});
        let b = Middleware::sync(|_| {});
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }
}
