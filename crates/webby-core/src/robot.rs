//! The robot.
//!
//! [`Robot`] is the dispatch engine. It owns the listener registry, the three
//! middleware pipelines, the adapter and the brain, and it exposes the
//! registration API scripts use.
//!
//! # Dispatch
//!
//! [`Robot::receive`] pushes a message through the engine:
//!
//! 1. The receive middleware runs over a [`ReceiveContext`].
//! 2. Unless it blocked, every listener is offered the message in
//!    registration order. A listener that calls [`Response::finish`] stops
//!    the loop.
//! 3. If no listener matched, the message is received again wrapped in a
//!    [`MessageKind::CatchAll`](crate::message::MessageKind::CatchAll), which
//!    only [`catch_all`](Robot::catch_all) listeners match.
//!
//! Failures anywhere on this path are caught and handed to the registered
//! error handlers; `receive` itself never fails.
//!
//! ```rust,ignore
//! let robot = Robot::new(RobotConfig::named("Meg"), ShellAdapter::new());
//!
//! robot.hear(Regex::new("^ping$")?, |res: Response| async move {
//!     res.send(["PONG"]).await;
//! });
//!
//! robot.respond(Regex::new(r"(?i)open the (.*) doors")?, |res: Response| async move {
//!     let door = res.group(1).unwrap_or("pod bay");
//!     res.reply([format!("I'm afraid I can't let you open the {door} doors")]).await;
//! })?;
//!
//! robot.error(|err, _res| tracing::warn!(%err, "script failure"));
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use regex::Regex;
use tokio::sync::broadcast;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::adapter::{Adapter, BoxedAdapter};
use crate::brain::Brain;
use crate::config::RobotConfig;
use crate::error::{BotError, BotResult};
use crate::listener::{
    CallbackResult, Listener, ListenerContext, ListenerMatcher, ListenerOptions, into_callback,
};
use crate::message::{Match, Message};
use crate::middleware::{
    MiddlewareResult, Pipeline, PipelineContext, PipelineOutcome, from_fn,
};
use crate::response::{Response, ResponseContext};

const EVENT_CAPACITY: usize = 16;

/// A handler invoked for every error reported on the robot's error channel.
pub type ErrorHandler = Arc<dyn Fn(&BotError, Option<&Response>) + Send + Sync>;

/// Lifecycle notifications emitted by a [`Robot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotEvent {
    /// [`Robot::run`] was called.
    Running,
    /// An error was reported. Carries the rendered error.
    Error(String),
    /// [`Robot::shutdown`] finished.
    Shutdown,
}

/// The context the receive pipeline runs over.
#[derive(Debug)]
pub struct ReceiveContext {
    /// The response for the received message. It has no match.
    pub response: Response,
}

impl ReceiveContext {
    /// Returns the received message.
    pub fn message(&self) -> &Message {
        self.response.message()
    }

    /// Returns the received message for editing, before any listener sees it.
    pub fn message_mut(&mut self) -> &mut Message {
        self.response.message_mut()
    }
}

impl PipelineContext for ReceiveContext {
    fn response(&self) -> Option<&Response> {
        Some(&self.response)
    }
}

// =============================================================================
// Robot
// =============================================================================

/// A cheaply cloneable handle to the dispatch engine.
#[derive(Clone)]
pub struct Robot {
    inner: Arc<RobotInner>,
}

struct RobotInner {
    config: RobotConfig,
    adapter: BoxedAdapter,
    brain: Brain,
    listeners: RwLock<Vec<Arc<Listener>>>,
    receive_pipeline: Pipeline<ReceiveContext>,
    listener_pipeline: Pipeline<ListenerContext>,
    response_pipeline: Pipeline<ResponseContext>,
    error_handlers: RwLock<Vec<ErrorHandler>>,
    events: broadcast::Sender<RobotEvent>,
}

impl Robot {
    /// Creates a robot that talks through `adapter`.
    pub fn new(config: RobotConfig, adapter: impl Adapter) -> Self {
        Self::with_adapter(config, Arc::new(adapter))
    }

    /// Creates a robot from an already shared adapter.
    pub fn with_adapter(config: RobotConfig, adapter: BoxedAdapter) -> Self {
        let brain = Brain::new();
        brain.set_auto_save(config.brain.auto_save);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(RobotInner {
                config,
                adapter,
                brain,
                listeners: RwLock::new(Vec::new()),
                receive_pipeline: Pipeline::new("receive"),
                listener_pipeline: Pipeline::new("listener"),
                response_pipeline: Pipeline::new("response"),
                error_handlers: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// Returns the robot's name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Returns the robot's alias.
    pub fn alias(&self) -> Option<&str> {
        self.inner.config.alias.as_deref()
    }

    /// Returns the configuration the robot was built with.
    pub fn config(&self) -> &RobotConfig {
        &self.inner.config
    }

    /// Returns the adapter.
    pub fn adapter(&self) -> &BoxedAdapter {
        &self.inner.adapter
    }

    /// Returns the brain.
    pub fn brain(&self) -> &Brain {
        &self.inner.brain
    }

    /// Returns a snapshot of the registered listeners.
    pub fn listeners(&self) -> Vec<Arc<Listener>> {
        self.inner.listeners.read().clone()
    }

    /// Returns the receive pipeline, for registering [`Middleware`] types.
    ///
    /// [`Middleware`]: crate::middleware::Middleware
    pub fn receive_pipeline(&self) -> &Pipeline<ReceiveContext> {
        &self.inner.receive_pipeline
    }

    /// Returns the listener pipeline.
    pub fn listener_pipeline(&self) -> &Pipeline<ListenerContext> {
        &self.inner.listener_pipeline
    }

    /// Returns the response pipeline.
    pub fn response_pipeline(&self) -> &Pipeline<ResponseContext> {
        &self.inner.response_pipeline
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RobotEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: RobotEvent) {
        let _ = self.inner.events.send(event);
    }

    // =========================================================================
    // Listener registration
    // =========================================================================

    /// Registers a prepared listener.
    pub fn add_listener(&self, listener: Listener) {
        debug!(
            listener = listener.id().unwrap_or("<anonymous>"),
            "Registering listener"
        );
        self.inner.listeners.write().push(Arc::new(listener));
    }

    /// Registers a listener with an arbitrary matcher.
    pub fn listen<M, F, Fut, R>(&self, matcher: M, callback: F)
    where
        M: Fn(&Message) -> Option<Match> + Send + Sync + 'static,
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.listen_with(matcher, ListenerOptions::default(), callback);
    }

    /// Like [`listen`](Self::listen), with listener options.
    pub fn listen_with<M, F, Fut, R>(&self, matcher: M, options: ListenerOptions, callback: F)
    where
        M: Fn(&Message) -> Option<Match> + Send + Sync + 'static,
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.add_listener(Listener::new(
            ListenerMatcher::from_fn(matcher),
            options,
            into_callback(callback),
        ));
    }

    /// Registers a listener for text messages matching `regex` anywhere.
    pub fn hear<F, Fut, R>(&self, regex: Regex, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.hear_with(regex, ListenerOptions::default(), callback);
    }

    /// Like [`hear`](Self::hear), with listener options.
    pub fn hear_with<F, Fut, R>(&self, regex: Regex, options: ListenerOptions, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.add_listener(Listener::new(
            ListenerMatcher::Text(regex),
            options,
            into_callback(callback),
        ));
    }

    /// Registers a listener for text messages addressed to the robot.
    ///
    /// See [`respond_pattern`](Self::respond_pattern) for how addressing is
    /// recognized.
    pub fn respond<F, Fut, R>(&self, regex: Regex, callback: F) -> BotResult<()>
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.respond_with(regex, ListenerOptions::default(), callback)
    }

    /// Like [`respond`](Self::respond), with listener options.
    pub fn respond_with<F, Fut, R>(
        &self,
        regex: Regex,
        options: ListenerOptions,
        callback: F,
    ) -> BotResult<()>
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        let pattern = self.respond_pattern(&regex)?;
        self.hear_with(pattern, options, callback);
        Ok(())
    }

    /// Registers a listener for users entering a room.
    pub fn enter<F, Fut, R>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.enter_with(ListenerOptions::default(), callback);
    }

    /// Like [`enter`](Self::enter), with listener options.
    pub fn enter_with<F, Fut, R>(&self, options: ListenerOptions, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.listen_with(kind_matcher(Message::is_enter), options, callback);
    }

    /// Registers a listener for users leaving a room.
    pub fn leave<F, Fut, R>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.leave_with(ListenerOptions::default(), callback);
    }

    /// Like [`leave`](Self::leave), with listener options.
    pub fn leave_with<F, Fut, R>(&self, options: ListenerOptions, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.listen_with(kind_matcher(Message::is_leave), options, callback);
    }

    /// Registers a listener for topic changes.
    pub fn topic<F, Fut, R>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.topic_with(ListenerOptions::default(), callback);
    }

    /// Like [`topic`](Self::topic), with listener options.
    pub fn topic_with<F, Fut, R>(&self, options: ListenerOptions, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.listen_with(kind_matcher(Message::is_topic), options, callback);
    }

    /// Registers a listener for messages no other listener matched.
    ///
    /// The callback's response wraps the catch-all message; the original
    /// message is available through [`Message::inner`].
    pub fn catch_all<F, Fut, R>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.catch_all_with(ListenerOptions::default(), callback);
    }

    /// Like [`catch_all`](Self::catch_all), with listener options.
    pub fn catch_all_with<F, Fut, R>(&self, options: ListenerOptions, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: CallbackResult,
    {
        self.listen_with(kind_matcher(Message::is_catch_all), options, callback);
    }

    /// Builds the regex `respond` listeners use.
    ///
    /// The result matches `regex` only when the text starts with the robot's
    /// name or alias, optionally prefixed with `@` and followed by `:` or
    /// `,`. The name and alias match case-insensitively; when both are set,
    /// the longer one is tried first so a name that is a prefix of the alias
    /// (or vice versa) does not cut the match short. An empty alias counts as
    /// no alias; a robot with neither a name nor an alias is rejected.
    pub fn respond_pattern(&self, regex: &Regex) -> BotResult<Regex> {
        let source = regex.as_str();
        if is_anchored(source) {
            warn!(
                pattern = source,
                "Anchors don't work well with respond, perhaps you want to use 'hear'"
            );
        }

        // An empty name or alias would match unaddressed text.
        let mut names: Vec<String> = [Some(self.name()), self.alias()]
            .into_iter()
            .flatten()
            .filter(|name| !name.is_empty())
            .map(regex::escape)
            .collect();
        if names.is_empty() {
            return Err(BotError::invalid_argument(
                "respond requires a non-empty robot name or alias",
            ));
        }
        names.sort_by(|a, b| b.len().cmp(&a.len()));
        names.dedup();

        let addressed = names
            .iter()
            .map(|name| format!("(?i:{name})[:,]?"))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Regex::new(&format!(r"^\s*[@]?(?:{addressed})\s*(?:{source})"))?)
    }

    // =========================================================================
    // Middleware and error handlers
    // =========================================================================

    /// Appends a middleware to the receive pipeline.
    pub fn receive_middleware<F>(&self, middleware: F)
    where
        F: for<'a> Fn(&'a mut ReceiveContext) -> BoxFuture<'a, MiddlewareResult<ReceiveContext>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.receive_pipeline.register(from_fn(middleware));
    }

    /// Appends a middleware to the listener pipeline.
    pub fn listener_middleware<F>(&self, middleware: F)
    where
        F: for<'a> Fn(&'a mut ListenerContext) -> BoxFuture<'a, MiddlewareResult<ListenerContext>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.listener_pipeline.register(from_fn(middleware));
    }

    /// Appends a middleware to the response pipeline.
    pub fn response_middleware<F>(&self, middleware: F)
    where
        F: for<'a> Fn(&'a mut ResponseContext) -> BoxFuture<'a, MiddlewareResult<ResponseContext>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.response_pipeline.register(from_fn(middleware));
    }

    /// Registers an error handler.
    pub fn error<F>(&self, handler: F)
    where
        F: Fn(&BotError, Option<&Response>) + Send + Sync + 'static,
    {
        self.inner.error_handlers.write().push(Arc::new(handler));
    }

    /// Reports `error` to every error handler.
    ///
    /// The error is always logged. A panicking handler is logged and does not
    /// prevent the remaining handlers from running.
    pub fn invoke_error_handlers(&self, error: &BotError, response: Option<&Response>) {
        error!(robot = %self.name(), error = %error, "Robot error");
        self.emit(RobotEvent::Error(error.to_string()));

        let handlers = self.inner.error_handlers.read().clone();
        for handler in handlers {
            let call = std::panic::catch_unwind(AssertUnwindSafe(|| handler(error, response)));
            if let Err(panic) = call {
                error!(
                    error = %BotError::from_panic(panic),
                    "Error handler panicked"
                );
            }
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatches a message through the receive middleware and the listeners.
    ///
    /// Resolves once every middleware cleanup ran, including those of a
    /// catch-all dispatch the message may have triggered. Returns whether the
    /// receive middleware let the message through.
    pub async fn receive(&self, message: Message) -> PipelineOutcome {
        self.dispatch(Arc::new(message)).await
    }

    fn dispatch(&self, message: Arc<Message>) -> BoxFuture<'_, PipelineOutcome> {
        let span = debug_span!(
            "receive",
            robot = %self.name(),
            kind = message.kind().name(),
        );

        Box::pin(
            async move {
                let mut ctx = ReceiveContext {
                    response: Response::new(self.clone(), message, None),
                };
                let robot = self.clone();

                self.inner
                    .receive_pipeline
                    .execute(&mut ctx, move |ctx: &mut ReceiveContext| {
                        let message = Arc::clone(ctx.response.message());
                        Box::pin(async move {
                            robot.process_listeners(message).await;
                            Ok(())
                        })
                    })
                    .await
            }
            .instrument(span),
        )
    }

    async fn process_listeners(&self, message: Arc<Message>) {
        let listeners = self.listeners();
        let mut matched = false;

        for listener in &listeners {
            if message.is_done() {
                debug!("Message finished, skipping remaining listeners");
                break;
            }

            let call = listener.call(Arc::clone(&message), self, &self.inner.listener_pipeline);
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(true) => matched = true,
                Ok(false) => {}
                Err(panic) => {
                    let response = Response::new(self.clone(), Arc::clone(&message), None);
                    self.invoke_error_handlers(&BotError::from_panic(panic), Some(&response));
                }
            }
        }

        if !matched && !message.is_catch_all() {
            debug!("No listener matched, dispatching catch-all message");
            self.dispatch(Arc::new(Message::catch_all(message))).await;
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the robot: schedules brain auto-save and runs the adapter.
    ///
    /// Adapter failures, panics included, are reported to the error handlers
    /// and returned.
    pub async fn run(&self) -> BotResult<()> {
        info!(
            robot = %self.name(),
            adapter = self.inner.adapter.name(),
            "Robot running"
        );
        self.emit(RobotEvent::Running);
        self.inner
            .brain
            .reset_save_interval(self.inner.config.brain.save_interval());

        let run = AssertUnwindSafe(self.inner.adapter.run(self.clone()));
        match run.catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.invoke_error_handlers(&BotError::Uncaught(err.to_string()), None);
                Err(err.into())
            }
            Err(panic) => {
                let err = BotError::Uncaught(format!(
                    "adapter '{}' {}",
                    self.inner.adapter.name(),
                    BotError::from_panic(panic)
                ));
                self.invoke_error_handlers(&err, None);
                Err(err)
            }
        }
    }

    /// Closes the brain and the adapter.
    pub async fn shutdown(&self) {
        info!(robot = %self.name(), "Robot shutting down");
        self.inner.brain.close();
        if let Err(err) = self.inner.adapter.close().await {
            self.invoke_error_handlers(&BotError::Adapter(err), None);
        }
        self.emit(RobotEvent::Shutdown);
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name())
            .field("alias", &self.alias())
            .field("adapter", &self.inner.adapter.name())
            .field("listener_count", &self.inner.listeners.read().len())
            .finish()
    }
}

/// Whether `source` starts with `^` or `\A`, after any leading flag groups
/// such as `(?i)`.
fn is_anchored(source: &str) -> bool {
    let mut rest = source;
    while let Some(after) = rest.strip_prefix("(?") {
        match after.find(')') {
            Some(end) if after[..end].chars().all(|c| c.is_ascii_alphabetic() || c == '-') => {
                rest = &after[end + 1..]
            }
            _ => break,
        }
    }
    rest.starts_with('^') || rest.starts_with("\\A")
}

fn kind_matcher(
    predicate: fn(&Message) -> bool,
) -> impl Fn(&Message) -> Option<Match> + Send + Sync + 'static {
    move |message| predicate(message).then(Match::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Envelope;
    use crate::error::AdapterResult;
    use crate::user::{User, UserOptions};
    use async_trait::async_trait;

    struct NullAdapter;

    #[async_trait]
    impl Adapter for NullAdapter {
        fn name(&self) -> &str {
            "null"
        }

        async fn send(&self, _envelope: &Envelope, _strings: &[String]) -> AdapterResult<()> {
            Ok(())
        }

        async fn run(&self, _robot: Robot) -> AdapterResult<()> {
            Ok(())
        }
    }

    fn robot(name: &str, alias: Option<&str>) -> Robot {
        let mut config = RobotConfig::named(name);
        config.alias = alias.map(str::to_string);
        Robot::new(config, NullAdapter)
    }

    fn captured(pattern: &Regex, text: &str) -> Option<String> {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    #[test]
    fn respond_pattern_matches_name_and_alias() {
        let robot = robot("Webby", Some("Alias"));
        let pattern = robot.respond_pattern(&Regex::new("(.*)").unwrap()).unwrap();

        assert_eq!(captured(&pattern, "Webbymessage123").as_deref(), Some("message123"));
        assert_eq!(captured(&pattern, "Aliasmessage123").as_deref(), Some("message123"));
        assert_eq!(captured(&pattern, "@webby: message123").as_deref(), Some("message123"));
        assert!(!pattern.is_match("message123"));
    }

    #[test]
    fn respond_pattern_prefers_longer_of_name_and_alias() {
        let regex = Regex::new("(.*)").unwrap();
        for (name, alias) in [("Meg", "Megan"), ("Megan", "Meg")] {
            let pattern = robot(name, Some(alias)).respond_pattern(&regex).unwrap();
            assert_eq!(captured(&pattern, "Meg message123").as_deref(), Some("message123"));
            assert_eq!(captured(&pattern, "Megan message123").as_deref(), Some("message123"));
            assert!(!pattern.is_match("message123"));
        }
    }

    #[test]
    fn respond_pattern_escapes_the_name() {
        let robot = robot("web.by", None);
        let pattern = robot.respond_pattern(&Regex::new("hi").unwrap()).unwrap();
        assert!(pattern.is_match("web.by hi"));
        assert!(!pattern.is_match("webxby hi"));
    }

    #[test]
    fn registration_appends_listeners() {
        let robot = robot("Webby", None);
        assert!(robot.listeners().is_empty());

        robot.listen(|_| Some(Match::new()), |_res| async {});
        robot.hear(Regex::new("x").unwrap(), |_res| async {});
        robot.respond(Regex::new("x").unwrap(), |_res| async {}).unwrap();
        robot.enter(|_res| async {});
        robot.leave(|_res| async {});
        robot.topic(|_res| async {});
        robot.catch_all_with(ListenerOptions::new().id("fallback"), |_res| async {});

        let listeners = robot.listeners();
        assert_eq!(listeners.len(), 7);
        assert_eq!(listeners[6].id(), Some("fallback"));
    }

    #[test]
    fn kind_listeners_match_only_their_kind() {
        let robot = robot("Webby", None);
        robot.enter(|_res| async {});
        robot.topic(|_res| async {});

        let user = Arc::new(User::new("1", UserOptions::new()));
        let listeners = robot.listeners();
        let enter = listeners[0].matcher();
        let topic = listeners[1].matcher();

        assert!(enter.matches(&Message::enter(Arc::clone(&user))).is_some());
        assert!(enter.matches(&Message::new_text(Arc::clone(&user), "hi")).is_none());
        assert!(topic.matches(&Message::topic(Arc::clone(&user), "news")).is_some());
        assert!(topic.matches(&Message::leave(user)).is_none());
    }

    #[test]
    fn error_handlers_run_despite_panicking_neighbours() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let robot = robot("Webby", None);
        let calls = Arc::new(AtomicUsize::new(0));
        robot.error(|_, _| panic!("handler exploded"));
        let counter = Arc::clone(&calls);
        robot.error(move |err, res| {
            assert!(res.is_none());
            assert_eq!(err.to_string(), "uncaught error: boom");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut events = robot.subscribe();
        robot.invoke_error_handlers(&BotError::Uncaught("boom".into()), None);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            RobotEvent::Error("uncaught error: boom".into())
        );
    }

    #[tokio::test]
    async fn run_and_shutdown_emit_lifecycle_events() {
        let robot = robot("Webby", None);
        let mut events = robot.subscribe();

        robot.run().await.unwrap();
        robot.shutdown().await;

        assert_eq!(events.recv().await.unwrap(), RobotEvent::Running);
        assert_eq!(events.recv().await.unwrap(), RobotEvent::Shutdown);
    }

    #[test]
    fn respond_pattern_ignores_empty_alias() {
        let robot = Robot::new(RobotConfig::named("Webby").with_alias(""), NullAdapter);
        let pattern = robot.respond_pattern(&Regex::new("(.*)").unwrap()).unwrap();

        assert_eq!(captured(&pattern, "Webby message123").as_deref(), Some("message123"));
        assert!(!pattern.is_match("message123"));
    }

    #[test]
    fn respond_pattern_falls_back_to_alias_without_name() {
        let pattern = robot("", Some("hal"))
            .respond_pattern(&Regex::new("(.*)").unwrap())
            .unwrap();
        assert_eq!(captured(&pattern, "hal: message123").as_deref(), Some("message123"));
        assert!(!pattern.is_match("message123"));

        let nameless = robot("", Some(""));
        assert!(matches!(
            nameless.respond_pattern(&Regex::new("x").unwrap()),
            Err(BotError::InvalidArgument(_))
        ));
    }

    #[test]
    fn anchors_are_detected_behind_flag_groups() {
        assert!(is_anchored("^open$"));
        assert!(is_anchored("(?i)^open$"));
        assert!(is_anchored("(?i)(?-u)^open"));
        assert!(is_anchored(r"\Aopen"));
        assert!(!is_anchored("open$"));
        assert!(!is_anchored("(?i)open"));
        assert!(!is_anchored("(?:^a)|b"));
    }

    struct PanickingAdapter;

    #[async_trait]
    impl Adapter for PanickingAdapter {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn send(&self, _envelope: &Envelope, _strings: &[String]) -> AdapterResult<()> {
            Ok(())
        }

        async fn run(&self, _robot: Robot) -> AdapterResult<()> {
            panic!("socket exploded")
        }
    }

    #[tokio::test]
    async fn adapter_panic_is_reported_as_uncaught() {
        use std::sync::Mutex;

        let robot = Robot::new(RobotConfig::named("Webby"), PanickingAdapter);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        robot.error(move |err, res| {
            assert!(res.is_none());
            sink.lock().unwrap().push(err.to_string());
        });

        let err = robot.run().await.unwrap_err();

        assert!(matches!(err, BotError::Uncaught(_)));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["uncaught error: adapter 'panicky' panicked: socket exploded".to_string()]
        );
    }

    #[tokio::test]
    async fn unsupported_operation_reaches_error_handlers() {
        let robot = robot("Webby", None);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        robot.error(move |err, res| {
            assert!(res.is_some());
            sink.lock().unwrap().push(err.to_string());
        });

        let user = Arc::new(User::new("1", UserOptions::new()));
        let message = Arc::new(Message::new_text(user, "hi"));
        let response = crate::response::Response::new(robot.clone(), message, None);
        response.reply(["hello"]).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["operation 'reply' is not supported by this adapter".to_string()]
        );
    }
}
