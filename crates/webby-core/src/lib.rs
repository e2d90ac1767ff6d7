//! # Webby Core
//!
//! The dispatch engine of the Webby chat bot.
//!
//! This crate provides:
//! - The message model and user records
//! - The brain, an in-memory store with save events for persistence backends
//! - The [`Adapter`] capability a chat source implements
//! - Middleware pipelines with ordered execution and reverse-order cleanups
//! - Listeners and responses
//! - The [`Robot`], which ties everything together and dispatches messages
//!
//! Configuration loading, logging setup and signal handling live in
//! `webby-runtime`.

pub mod adapter;
pub mod brain;
pub mod config;
pub mod error;
pub mod listener;
pub mod message;
pub mod middleware;
pub mod response;
pub mod robot;
pub mod user;

pub use adapter::{Adapter, BoxedAdapter, Envelope, ResponseMethod};
pub use brain::{Brain, BrainData, BrainEvent};
pub use config::{BrainConfig, RobotConfig};
pub use error::{AdapterError, AdapterResult, BotError, BotResult, BoxError};
pub use listener::{
    Callback, CallbackResult, Listener, ListenerBuilder, ListenerContext, ListenerMatcher,
    ListenerOptions, MatchFn, into_callback,
};
pub use message::{Match, Message, MessageKind};
pub use middleware::{
    BoxedMiddleware, Cleanup, Flow, FnMiddleware, Middleware, MiddlewareResult, Pipeline,
    PipelineContext, PipelineOutcome, from_fn,
};
pub use response::{Response, ResponseContext};
pub use robot::{ErrorHandler, ReceiveContext, Robot, RobotEvent};
pub use user::{User, UserId, UserOptions};

/// A type alias for a boxed, pinned future that is `Send`.
pub use futures::future::BoxFuture;

/// Commonly used types for writing scripts and adapters.
pub mod prelude {
    pub use crate::adapter::{Adapter, Envelope};
    pub use crate::error::{AdapterError, AdapterResult, BotError, BotResult};
    pub use crate::listener::ListenerOptions;
    pub use crate::message::{Match, Message};
    pub use crate::middleware::{Cleanup, Flow, PipelineOutcome};
    pub use crate::response::Response;
    pub use crate::robot::Robot;
    pub use crate::user::{User, UserOptions};
    pub use async_trait::async_trait;
    pub use regex::Regex;
}
