//! Listeners.
//!
//! A [`Listener`] pairs a matcher with a callback. When the robot receives a
//! message it asks every listener, in registration order, whether the message
//! matches. A match builds a [`Response`], runs the listener middleware and,
//! unless a middleware blocks, invokes the callback.
//!
//! # Callbacks
//!
//! Callbacks are async functions taking a [`Response`]. They may return `()`
//! or a `Result<(), E>` for any error convertible into [`BoxError`]:
//!
//! ```rust,ignore
//! async fn ping(res: Response) {
//!     res.send(["PONG"]).await;
//! }
//!
//! async fn lookup(res: Response) -> Result<(), std::io::Error> {
//!     let name = res.group(1).unwrap_or_default();
//!     res.reply([std::fs::read_to_string(name)?]).await;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{BotError, BotResult, BoxError};
use crate::message::{Match, Message};
use crate::middleware::{Pipeline, PipelineContext};
use crate::response::Response;
use crate::robot::Robot;

// =============================================================================
// Callbacks
// =============================================================================

/// A type-erased listener callback.
pub type Callback =
    Arc<dyn Fn(Response) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Return types accepted from listener callbacks.
pub trait CallbackResult: Send + 'static {
    /// Converts the value into the callback outcome.
    fn into_result(self) -> Result<(), BoxError>;
}

impl CallbackResult for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> CallbackResult for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

/// Converts an async function into a boxed [`Callback`].
pub fn into_callback<F, Fut, R>(f: F) -> Callback
where
    F: Fn(Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: CallbackResult,
{
    Arc::new(move |response| {
        let fut = f(response);
        Box::pin(async move { fut.await.into_result() })
    })
}

// =============================================================================
// Matchers and options
// =============================================================================

/// A predicate deciding whether a listener handles a message.
pub type MatchFn = Arc<dyn Fn(&Message) -> Option<Match> + Send + Sync>;

/// How a listener decides whether a message is for it.
#[derive(Clone)]
pub enum ListenerMatcher {
    /// An arbitrary predicate.
    Fn(MatchFn),
    /// A regex over the text of text messages. Other kinds never match.
    Text(Regex),
}

impl ListenerMatcher {
    /// Creates a predicate matcher.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Message) -> Option<Match> + Send + Sync + 'static,
    {
        Self::Fn(Arc::new(f))
    }

    /// Evaluates the matcher.
    pub fn matches(&self, message: &Message) -> Option<Match> {
        match self {
            Self::Fn(f) => f(message),
            Self::Text(regex) => message.match_pattern(regex),
        }
    }

    /// Returns the regex of a text matcher.
    pub fn regex(&self) -> Option<&Regex> {
        match self {
            Self::Text(regex) => Some(regex),
            Self::Fn(_) => None,
        }
    }
}

impl fmt::Debug for ListenerMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fn(_) => f.write_str("Fn(..)"),
            Self::Text(regex) => f.debug_tuple("Text").field(&regex.as_str()).finish(),
        }
    }
}

/// Metadata attached to a listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenerOptions {
    /// An identifier used in logs and error reports, and by middleware that
    /// wants to treat specific listeners differently.
    #[serde(default)]
    pub id: Option<String>,
    /// Free-form metadata for middleware.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl ListenerOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listener id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds a metadata entry.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for ListenerOptions {
    fn from(id: &str) -> Self {
        Self::new().id(id)
    }
}

// =============================================================================
// Listener
// =============================================================================

/// A registered matcher and callback.
pub struct Listener {
    matcher: ListenerMatcher,
    options: ListenerOptions,
    callback: Callback,
}

impl Listener {
    pub(crate) fn new(
        matcher: ListenerMatcher,
        options: ListenerOptions,
        callback: Callback,
    ) -> Self {
        Self {
            matcher,
            options,
            callback,
        }
    }

    /// Starts building a listener.
    pub fn builder() -> ListenerBuilder {
        ListenerBuilder::default()
    }

    /// Returns the matcher.
    pub fn matcher(&self) -> &ListenerMatcher {
        &self.matcher
    }

    /// Returns the options.
    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    /// Returns the listener id, if one was configured.
    pub fn id(&self) -> Option<&str> {
        self.options.id.as_deref()
    }

    /// Offers `message` to this listener.
    ///
    /// When the matcher accepts the message, the listener middleware runs
    /// with a terminal action that invokes the callback. Failures of the
    /// callback are reported to the robot's error handlers.
    ///
    /// Returns whether the matcher accepted the message, regardless of
    /// whether a middleware blocked the callback afterwards.
    pub async fn call(
        self: &Arc<Self>,
        message: Arc<Message>,
        robot: &Robot,
        pipeline: &Pipeline<ListenerContext>,
    ) -> bool {
        let Some(matched) = self.matcher.matches(&message) else {
            return false;
        };

        trace!(listener = self.id().unwrap_or("<anonymous>"), "Listener matched");

        let mut ctx = ListenerContext {
            listener: Arc::clone(self),
            response: Response::new(robot.clone(), message, Some(matched)),
        };
        let callback = Arc::clone(&self.callback);
        let id = self.options.id.clone();

        pipeline
            .execute(&mut ctx, move |ctx: &mut ListenerContext| {
                let response = ctx.response.clone();
                Box::pin(async move {
                    let outcome = AssertUnwindSafe(async move { callback(response).await })
                        .catch_unwind()
                        .await;
                    let source = match outcome {
                        Ok(Ok(())) => return Ok(()),
                        Ok(Err(err)) => err,
                        Err(panic) => Box::new(BotError::from_panic(panic)) as BoxError,
                    };
                    Err(BotError::ListenerCallback {
                        listener: id,
                        source,
                    })
                })
            })
            .await;

        true
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("matcher", &self.matcher)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Listener`].
#[derive(Default)]
pub struct ListenerBuilder {
    matcher: Option<ListenerMatcher>,
    options: ListenerOptions,
    callback: Option<Callback>,
}

impl ListenerBuilder {
    /// Matches with an arbitrary predicate.
    pub fn matcher<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message) -> Option<Match> + Send + Sync + 'static,
    {
        self.matcher = Some(ListenerMatcher::from_fn(f));
        self
    }

    /// Matches the text of text messages against `regex`.
    pub fn text(mut self, regex: Regex) -> Self {
        self.matcher = Some(ListenerMatcher::Text(regex));
        self
    }

    /// Sets a prepared matcher.
    pub fn listener_matcher(mut self, matcher: ListenerMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Sets the options.
    pub fn options(mut self, options: ListenerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the callback.
    pub fn callback<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.boxed_callback(into_callback(f))
    }

    /// Sets an already boxed callback.
    pub fn boxed_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Builds the listener.
    ///
    /// Fails with [`BotError::InvalidArgument`] when the matcher or the
    /// callback is missing.
    pub fn build(self) -> BotResult<Listener> {
        let matcher = self
            .matcher
            .ok_or_else(|| BotError::invalid_argument("missing a matcher"))?;
        let callback = self
            .callback
            .ok_or_else(|| BotError::invalid_argument("missing a callback"))?;

        Ok(Listener::new(matcher, self.options, callback))
    }
}

/// The context the listener pipeline runs over.
#[derive(Debug)]
pub struct ListenerContext {
    /// The listener that matched.
    pub listener: Arc<Listener>,
    /// The response built for the match.
    pub response: Response,
}

impl PipelineContext for ListenerContext {
    fn response(&self) -> Option<&Response> {
        Some(&self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{User, UserOptions};

    fn text(text: &str) -> Message {
        let user = Arc::new(User::new("1", UserOptions::new().room("#test")));
        Message::new_text(user, text)
    }

    #[test]
    fn build_requires_a_callback() {
        let err = Listener::builder()
            .matcher(|_| Some(Match::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidArgument(_)));
    }

    #[test]
    fn build_requires_a_matcher() {
        let err = Listener::builder()
            .callback(|_res| async {})
            .build()
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidArgument(_)));
    }

    #[test]
    fn options_default_to_no_id() {
        let listener = Listener::builder()
            .matcher(|_| Some(Match::new()))
            .callback(|_res| async {})
            .build()
            .unwrap();
        assert_eq!(listener.id(), None);
        assert!(listener.options().extra.is_empty());
    }

    #[test]
    fn options_carry_id_and_extras() {
        let options = ListenerOptions::new().id("ping").extra("rate_limit", 10);
        assert_eq!(options.id.as_deref(), Some("ping"));
        assert_eq!(options.extra.get("rate_limit"), Some(&Value::from(10)));
        assert_eq!(ListenerOptions::from("ping").id.as_deref(), Some("ping"));
    }

    #[test]
    fn text_matcher_ignores_other_kinds() {
        let matcher = ListenerMatcher::Text(Regex::new("^ping$").unwrap());
        assert!(matcher.matches(&text("ping")).is_some());
        assert!(matcher.matches(&text("pong")).is_none());

        let user = Arc::new(User::new("1", UserOptions::new()));
        assert!(matcher.matches(&Message::topic(user, "ping")).is_none());
    }

    #[test]
    fn callbacks_accept_unit_and_results() {
        let unit = into_callback(|_res: Response| async {});
        let failing = into_callback(|_res: Response| async {
            Err::<(), _>(std::io::Error::other("boom"))
        });
        let _ = (unit, failing);

        let ok: Result<(), BoxError> = ().into_result();
        assert!(ok.is_ok());
        let err = Err::<(), _>(std::io::Error::other("boom")).into_result();
        assert_eq!(err.unwrap_err().to_string(), "boom");
    }
}
