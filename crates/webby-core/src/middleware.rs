//! Middleware pipelines.
//!
//! A [`Pipeline`] runs an ordered list of middleware over a mutable context
//! and then a terminal action. Each middleware decides how the chain goes on
//! by returning a [`Flow`]:
//!
//! - [`Flow::Proceed`] passes control to the next link;
//! - [`Flow::ProceedWith`] does the same and registers a [`Cleanup`] that runs
//!   when the chain unwinds past this link;
//! - [`Flow::Halt`] blocks the pipeline: no later middleware and no terminal
//!   action run.
//!
//! Cleanups always run in reverse registration order, whether the pipeline
//! completed or was blocked:
//!
//! ```text
//! A -> B -> terminal -> cleanup(B) -> cleanup(A)
//! ```
//!
//! A middleware that returns an error or panics is treated as a halt, and the
//! failure is reported through the robot's error handlers together with the
//! context's [`Response`] when it has one.
//!
//! # Example
//!
//! ```rust,ignore
//! robot.receive_middleware(|ctx| {
//!     Box::pin(async move {
//!         if ctx.message().text() == Some("secret") {
//!             return Ok(Flow::Halt);
//!         }
//!         Ok(Flow::ProceedWith(Cleanup::sync(|_| {
//!             tracing::debug!("receive finished");
//!         })))
//!     })
//! });
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::error::{BotError, BoxError};
use crate::response::Response;

/// Result type returned by middleware.
pub type MiddlewareResult<C> = Result<Flow<C>, BoxError>;

// =============================================================================
// Flow control
// =============================================================================

/// How a middleware wants the pipeline to continue.
pub enum Flow<C> {
    /// Continue with the next middleware without registering a cleanup.
    Proceed,
    /// Continue and run the given cleanup when unwinding past this link.
    ProceedWith(Cleanup<C>),
    /// Stop. Nothing after this middleware runs; cleanups registered so far
    /// still unwind.
    Halt,
}

impl<C> fmt::Debug for Flow<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed => f.write_str("Proceed"),
            Self::ProceedWith(_) => f.write_str("ProceedWith(..)"),
            Self::Halt => f.write_str("Halt"),
        }
    }
}

/// Work deferred until the pipeline unwinds.
pub struct Cleanup<C>(Box<dyn for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, ()> + Send>);

impl<C> Cleanup<C> {
    /// Creates an asynchronous cleanup.
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, ()> + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Creates a cleanup from a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        Self::new(move |ctx: &mut C| {
            f(ctx);
            futures::future::ready(()).boxed()
        })
    }

    async fn run(self, ctx: &mut C) {
        (self.0)(ctx).await
    }
}

/// The result of running a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every middleware proceeded and the terminal action ran.
    Completed,
    /// A middleware halted, failed or panicked; the terminal action did not run.
    Blocked,
}

impl PipelineOutcome {
    /// Returns `true` if the terminal action ran.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns `true` if a middleware blocked the pipeline.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// A context a pipeline can run over.
pub trait PipelineContext: Send {
    /// The response associated with this dispatch, if any.
    fn response(&self) -> Option<&Response>;

    /// Reports a failure that happened while running the pipeline.
    fn report(&self, error: BotError) {
        match self.response() {
            Some(response) => response.robot().invoke_error_handlers(&error, Some(response)),
            None => error!(error = %error, "Pipeline failure without a response"),
        }
    }
}

/// A single pipeline step.
#[async_trait]
pub trait Middleware<C>: Send + Sync + 'static {
    /// Runs the step and tells the pipeline how to continue.
    async fn handle(&self, ctx: &mut C) -> MiddlewareResult<C>;
}

/// A middleware backed by a closure. See [`from_fn`].
pub struct FnMiddleware<C, F> {
    f: F,
    _marker: PhantomData<fn(C)>,
}

#[async_trait]
impl<C, F> Middleware<C> for FnMiddleware<C, F>
where
    C: Send + 'static,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, MiddlewareResult<C>> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &mut C) -> MiddlewareResult<C> {
        (self.f)(ctx).await
    }
}

/// Wraps a closure returning a boxed future as a [`Middleware`].
pub fn from_fn<C, F>(f: F) -> FnMiddleware<C, F>
where
    C: Send + 'static,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, MiddlewareResult<C>> + Send + Sync + 'static,
{
    FnMiddleware {
        f,
        _marker: PhantomData,
    }
}

/// A type-erased middleware that can be stored in a pipeline.
pub type BoxedMiddleware<C> = Arc<dyn Middleware<C>>;

// =============================================================================
// Pipeline
// =============================================================================

/// An ordered, append-only middleware stack.
pub struct Pipeline<C> {
    name: &'static str,
    stack: RwLock<Vec<BoxedMiddleware<C>>>,
}

impl<C> Pipeline<C>
where
    C: PipelineContext + 'static,
{
    /// Creates an empty pipeline. `name` is used in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stack: RwLock::new(Vec::new()),
        }
    }

    /// Returns the pipeline name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Appends a middleware to the stack.
    pub fn register(&self, middleware: impl Middleware<C>) {
        self.stack.write().push(Arc::new(middleware));
    }

    /// Returns the number of registered middleware.
    pub fn len(&self) -> usize {
        self.stack.read().len()
    }

    /// Returns `true` if no middleware is registered.
    pub fn is_empty(&self) -> bool {
        self.stack.read().is_empty()
    }

    /// Runs every middleware over `ctx`, then `terminal`, then unwinds the
    /// cleanups in reverse order.
    ///
    /// The stack is snapshotted up front: middleware registered while this
    /// call is in progress applies to the next call only. The returned future
    /// resolves exactly once, after the outermost cleanup.
    pub async fn execute<T>(&self, ctx: &mut C, terminal: T) -> PipelineOutcome
    where
        T: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, Result<(), BotError>> + Send,
    {
        let stack: Vec<BoxedMiddleware<C>> = self.stack.read().clone();
        let mut cleanups: Vec<Cleanup<C>> = Vec::with_capacity(stack.len());
        let mut outcome = PipelineOutcome::Completed;

        for (index, middleware) in stack.iter().enumerate() {
            trace!(pipeline = self.name, index, "Running middleware");

            let result = AssertUnwindSafe(middleware.handle(ctx))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(Flow::Proceed)) => {}
                Ok(Ok(Flow::ProceedWith(cleanup))) => cleanups.push(cleanup),
                Ok(Ok(Flow::Halt)) => {
                    debug!(pipeline = self.name, index, "Middleware halted the pipeline");
                    outcome = PipelineOutcome::Blocked;
                    break;
                }
                Ok(Err(err)) => {
                    ctx.report(BotError::Middleware(err));
                    outcome = PipelineOutcome::Blocked;
                    break;
                }
                Err(panic) => {
                    ctx.report(BotError::from_panic(panic));
                    outcome = PipelineOutcome::Blocked;
                    break;
                }
            }
        }

        if outcome.is_completed() {
            trace!(pipeline = self.name, "Running terminal action");
            match AssertUnwindSafe(terminal(ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => ctx.report(err),
                Err(panic) => ctx.report(BotError::from_panic(panic)),
            }
        }

        while let Some(cleanup) = cleanups.pop() {
            if let Err(panic) = AssertUnwindSafe(cleanup.run(ctx)).catch_unwind().await {
                ctx.report(BotError::from_panic(panic));
            }
        }

        outcome
    }
}

impl<C> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("middleware_count", &self.stack.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Trace {
        steps: Vec<String>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl PipelineContext for Trace {
        fn response(&self) -> Option<&Response> {
            None
        }

        fn report(&self, error: BotError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn step(name: &'static str) -> impl Middleware<Trace> {
        from_fn(move |ctx: &mut Trace| {
            Box::pin(async move {
                ctx.steps.push(name.to_string());
                Ok(Flow::ProceedWith(Cleanup::sync(move |ctx: &mut Trace| {
                    ctx.steps.push(format!("cleanup {name}"));
                })))
            })
        })
    }

    fn slow_step(name: &'static str, delay_ms: u64) -> impl Middleware<Trace> {
        from_fn(move |ctx: &mut Trace| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                ctx.steps.push(name.to_string());
                Ok(Flow::ProceedWith(Cleanup::new(move |ctx: &mut Trace| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        ctx.steps.push(format!("cleanup {name}"));
                    })
                })))
            })
        })
    }

    fn terminal(ctx: &mut Trace) -> BoxFuture<'_, Result<(), BotError>> {
        Box::pin(async move {
            ctx.steps.push("terminal".to_string());
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_runs_in_order_and_unwinds_lifo() {
        let pipeline = Pipeline::new("test");
        pipeline.register(step("A"));
        pipeline.register(step("B"));

        let mut ctx = Trace::default();
        let outcome = pipeline.execute(&mut ctx, terminal).await;

        assert_eq!(outcome, PipelineOutcome::Completed);
        assert_eq!(
            ctx.steps,
            vec!["A", "B", "terminal", "cleanup B", "cleanup A"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_delays_keep_order() {
        let pipeline = Pipeline::new("test");
        pipeline.register(slow_step("A", 30));
        pipeline.register(slow_step("B", 5));

        let mut ctx = Trace::default();
        pipeline.execute(&mut ctx, terminal).await;

        assert_eq!(
            ctx.steps,
            vec!["A", "B", "terminal", "cleanup B", "cleanup A"]
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_runs_terminal() {
        let pipeline: Pipeline<Trace> = Pipeline::new("test");
        let mut ctx = Trace::default();
        let outcome = pipeline.execute(&mut ctx, terminal).await;

        assert!(outcome.is_completed());
        assert_eq!(ctx.steps, vec!["terminal"]);
    }

    #[tokio::test]
    async fn test_plain_proceed_registers_no_cleanup() {
        let pipeline = Pipeline::new("test");
        pipeline.register(step("A"));
        pipeline.register(from_fn(|ctx: &mut Trace| {
            Box::pin(async move {
                ctx.steps.push("B".to_string());
                Ok(Flow::Proceed)
            })
        }));

        let mut ctx = Trace::default();
        pipeline.execute(&mut ctx, terminal).await;

        assert_eq!(ctx.steps, vec!["A", "B", "terminal", "cleanup A"]);
    }

    #[tokio::test]
    async fn test_halt_blocks_rest_and_unwinds_earlier_cleanups() {
        let pipeline = Pipeline::new("test");
        pipeline.register(step("A"));
        pipeline.register(step("B"));
        pipeline.register(from_fn(|ctx: &mut Trace| {
            Box::pin(async move {
                ctx.steps.push("halt".to_string());
                Ok(Flow::Halt)
            })
        }));
        pipeline.register(step("D"));

        let mut ctx = Trace::default();
        let outcome = pipeline.execute(&mut ctx, terminal).await;

        assert_eq!(outcome, PipelineOutcome::Blocked);
        assert_eq!(
            ctx.steps,
            vec!["A", "B", "halt", "cleanup B", "cleanup A"]
        );
        assert!(ctx.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_is_reported_and_blocks() {
        let pipeline = Pipeline::new("test");
        pipeline.register(step("A"));
        pipeline.register(from_fn(|_: &mut Trace| {
            Box::pin(async move { Err::<Flow<Trace>, BoxError>("nope".into()) })
        }));
        pipeline.register(step("C"));

        let mut ctx = Trace::default();
        let outcome = pipeline.execute(&mut ctx, terminal).await;

        assert!(outcome.is_blocked());
        assert_eq!(ctx.steps, vec!["A", "cleanup A"]);
        assert_eq!(
            *ctx.errors.lock().unwrap(),
            vec!["middleware failed: nope".to_string()]
        );
    }

    #[tokio::test]
    async fn test_panic_is_caught_and_blocks() {
        let pipeline = Pipeline::new("test");
        pipeline.register(step("A"));
        pipeline.register(from_fn(|_: &mut Trace| {
            Box::pin(async move { panic!("middleware exploded") })
        }));

        let mut ctx = Trace::default();
        let outcome = pipeline.execute(&mut ctx, terminal).await;

        assert!(outcome.is_blocked());
        assert_eq!(ctx.steps, vec!["A", "cleanup A"]);
        assert_eq!(
            *ctx.errors.lock().unwrap(),
            vec!["panicked: middleware exploded".to_string()]
        );
    }

    #[tokio::test]
    async fn test_terminal_errors_are_reported_and_cleanups_run() {
        let pipeline = Pipeline::new("test");
        pipeline.register(step("A"));

        let mut ctx = Trace::default();
        let outcome = pipeline
            .execute(&mut ctx, |_: &mut Trace| {
                Box::pin(async move { Err(BotError::Uncaught("terminal".into())) })
            })
            .await;

        assert!(outcome.is_completed());
        assert_eq!(ctx.steps, vec!["A", "cleanup A"]);
        assert_eq!(
            *ctx.errors.lock().unwrap(),
            vec!["uncaught error: terminal".to_string()]
        );
    }

    #[tokio::test]
    async fn test_panicking_cleanup_does_not_stop_unwinding() {
        let pipeline = Pipeline::new("test");
        pipeline.register(step("A"));
        pipeline.register(from_fn(|_: &mut Trace| {
            Box::pin(async move {
                Ok(Flow::ProceedWith(Cleanup::sync(|_: &mut Trace| {
                    panic!("cleanup exploded")
                })))
            })
        }));

        let mut ctx = Trace::default();
        pipeline.execute(&mut ctx, terminal).await;

        assert_eq!(ctx.steps, vec!["A", "terminal", "cleanup A"]);
        assert_eq!(ctx.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_registration_applies_to_next_run() {
        let pipeline = Arc::new(Pipeline::new("test"));
        let inner = Arc::clone(&pipeline);
        pipeline.register(from_fn(move |ctx: &mut Trace| {
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                ctx.steps.push("register".to_string());
                inner.register(step("late"));
                Ok(Flow::Proceed)
            })
        }));

        let mut ctx = Trace::default();
        pipeline.execute(&mut ctx, terminal).await;
        assert_eq!(ctx.steps, vec!["register", "terminal"]);
        assert_eq!(pipeline.len(), 2);
    }
}
