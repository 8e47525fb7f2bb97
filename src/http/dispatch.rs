//! Procedure registry, middleware chain and per-call dispatch.
//!
//! # Per-call flow
//! ```text
//! end-of-stream
//!     → routing key (path without query)
//!     → registry hit:  every middleware in registration order, then the procedure
//!     → registry miss: response.body = "Procedure not found!", nothing else runs
//! ```
//!
//! # Design Decisions
//! - Registry is a `DashMap`; the chain is an `ArcSwap` snapshot, so attach/use/unuse
//!   may run while calls are in flight. A call sees the chain as it was when it started.
//! - `unuse` keeps the relative order of the remaining middleware.

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::context::{Context, NOT_FOUND_BODY};
use crate::http::handler::{Middleware, Procedure};
use crate::observability::metrics::CallOutcome;

/// Routing key for a procedure name.
pub fn route_key(name: &str) -> String {
    format!("/{}", name)
}

/// Shared dispatch state for one server.
#[derive(Debug, Default)]
pub struct Dispatcher {
    procedures: DashMap<String, Procedure>,
    chain: ArcSwap<Vec<Middleware>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `procedure` under `/name`. A later attach with the same name replaces it.
    pub fn attach(&self, name: &str, procedure: Procedure) {
        let key = route_key(name);
        if self.procedures.insert(key.clone(), procedure).is_some() {
            tracing::debug!(route = %key, "Procedure replaced");
        } else {
            tracing::debug!(route = %key, "Procedure attached");
        }
    }

    /// Whether a procedure is registered under `/name`.
    pub fn contains(&self, name: &str) -> bool {
        self.procedures.contains_key(&route_key(name))
    }

    /// Registered routing keys, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.procedures.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Append to the chain. The same instance may be added more than once.
    pub fn use_middleware(&self, middleware: Middleware) {
        self.chain.rcu(|chain| {
            let mut next = Vec::clone(chain);
            next.push(middleware.clone());
            next
        });
    }

    /// Remove every occurrence of `middleware` from the chain, keeping order.
    pub fn unuse_middleware(&self, middleware: &Middleware) {
        self.chain.rcu(|chain| {
            chain
                .iter()
                .filter(|m| !m.same(middleware))
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    /// Number of entries in the chain.
    pub fn middleware_len(&self) -> usize {
        self.chain.load().len()
    }

    fn lookup(&self, key: &str) -> Option<Procedure> {
        // Clone out so no shard lock is held across an await.
        self.procedures.get(key).map(|entry| entry.value().clone())
    }

    /// Route and run one call against `ctx`.
    pub async fn dispatch(&self, ctx: &mut Context) -> CallOutcome {
        let key = ctx.routing_key().to_string();
        let Some(procedure) = self.lookup(&key) else {
            tracing::debug!(route = %key, "No procedure registered");
            ctx.response.body = NOT_FOUND_BODY.to_string();
            return CallOutcome::NotFound;
        };

        let chain = self.chain.load_full();
        for middleware in chain.iter() {
            middleware.call(ctx).await;
        }
        procedure.call(ctx).await;
        CallOutcome::Dispatched
    }

    /// Run the procedure registered as `name` directly, skipping the chain.
    ///
    /// Returns false if there is no such procedure.
    pub async fn invoke(&self, name: &str, ctx: &mut Context) -> bool {
        match self.lookup(&route_key(name)) {
            Some(procedure) => {
                procedure.call(ctx).await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HeaderSet;

    fn call(path: &str) -> Context {
        Context::new(HeaderSet {
            path: path.to_string(),
            ..HeaderSet::default()
        })
    }

    fn tag(label: &'static str) -> Middleware {
        Middleware::sync(move |ctx| ctx.response.body.push_str(label))
    }

    #[tokio::test]
    async fn chain_runs_in_order_before_procedure() {
        let d = Dispatcher::new();
        d.use_middleware(tag("1"));
        d.use_middleware(tag("2"));
        d.use_middleware(tag("3"));
        d.attach("p", Procedure::sync(|ctx| ctx.response.body.push_str("P")));

        let mut ctx = call("/p");
        assert_eq!(d.dispatch(&mut ctx).await, CallOutcome::Dispatched);
        assert_eq!(ctx.response.body, "123P");
    }

    #[tokio::test]
    async fn unknown_route_skips_chain() {
        let d = Dispatcher::new();
        d.use_middleware(tag("x"));
        d.attach("p", Procedure::sync(|ctx| ctx.response.body.push_str("P")));

        let mut ctx = call("/missing");
        assert_eq!(d.dispatch(&mut ctx).await, CallOutcome::NotFound);
        assert_eq!(ctx.response.body, "Procedure not found!");
        assert_eq!(ctx.response.headers.status, Some(200));
    }

    #[tokio::test]
    async fn routing_is_exact_and_case_sensitive() {
        let d = Dispatcher::new();
        d.attach("hi", Procedure::sync(|ctx| ctx.response.body = "Hi!".into()));

        let mut upper = call("/Hi");
        assert_eq!(d.dispatch(&mut upper).await, CallOutcome::NotFound);

        let mut nested = call("/hi/there");
        assert_eq!(d.dispatch(&mut nested).await, CallOutcome::NotFound);

        let mut query = call("/hi?lang=en");
        assert_eq!(d.dispatch(&mut query).await, CallOutcome::Dispatched);
        assert_eq!(query.response.body, "Hi!");
    }

    #[tokio::test]
    async fn attach_overwrites() {
        let d = Dispatcher::new();
        d.attach("p", Procedure::sync(|ctx| ctx.response.body = "old".into()));
        d.attach("p", Procedure::sync(|ctx| ctx.response.body = "new".into()));
        assert_eq!(d.routes(), vec!["/p".to_string()]);

        let mut ctx = call("/p");
        d.dispatch(&mut ctx).await;
        assert_eq!(ctx.response.body, "new");
    }

    #[tokio::test]
    async fn unuse_third_of_three_keeps_order() {
        let d = Dispatcher::new();
        let third = tag("3");
        d.use_middleware(tag("1"));
        d.use_middleware(tag("2"));
        d.use_middleware(third.clone());
        d.unuse_middleware(&third);
        d.attach("p", Procedure::sync(|_| {}));

        let mut ctx = call("/p");
        d.dispatch(&mut ctx).await;
        assert_eq!(ctx.response.body, "12");
    }

    #[tokio::test]
    async fn unuse_middle_keeps_order_and_removes_duplicates() {
        let d = Dispatcher::new();
        let dup = tag("d");
        d.use_middleware(tag("a"));
        d.use_middleware(dup.clone());
        d.use_middleware(tag("b"));
        d.use_middleware(dup.clone());
        d.use_middleware(tag("c"));
        assert_eq!(d.middleware_len(), 5);

        d.unuse_middleware(&dup);
        assert_eq!(d.middleware_len(), 3);
        d.attach("p", Procedure::sync(|_| {}));

        let mut ctx = call("/p");
        d.dispatch(&mut ctx).await;
        assert_eq!(ctx.response.body, "abc");
    }

    #[tokio::test]
    async fn unuse_unknown_is_noop() {
        let d = Dispatcher::new();
        d.use_middleware(tag("a"));
        d.unuse_middleware(&tag("a"));
        assert_eq!(d.middleware_len(), 1);
    }

    #[tokio::test]
    async fn middleware_request_mutation_visible_to_procedure() {
        let d = Dispatcher::new();
        d.use_middleware(Middleware::sync(|ctx| {
            ctx.request.body = ctx.request.body.to_uppercase();
        }));
        d.attach(
            "echo",
            Procedure::new(|ctx| {
                Box::pin(async move {
                    ctx.response.body = ctx.request.body.clone();
                })
            }),
        );

        let mut ctx = call("/echo");
        ctx.request.body = "shout".into();
        d.dispatch(&mut ctx).await;
        assert_eq!(ctx.response.body, "SHOUT");
    }

    #[tokio::test]
    async fn invoke_skips_chain() {
        let d = Dispatcher::new();
        d.use_middleware(tag("m"));
        d.attach("p", Procedure::sync(|ctx| ctx.response.body.push_str("P")));

        let mut ctx = Context::default();
        assert!(d.invoke("p", &mut ctx).await);
        assert_eq!(ctx.response.body, "P");
        assert!(!d.invoke("nope", &mut ctx).await);
    }
}
