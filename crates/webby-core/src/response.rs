//! Responses.
//!
//! A [`Response`] is created for every listener match (and for every receive
//! dispatch). It binds the robot, the message and the match together and
//! offers the outbound operations. Every outbound call runs through the
//! robot's response middleware before it reaches the adapter, so middleware
//! can rewrite or drop what gets delivered.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use tracing::debug;

use crate::adapter::{Envelope, ResponseMethod};
use crate::error::BotError;
use crate::message::{Match, Message};
use crate::middleware::{PipelineContext, PipelineOutcome};
use crate::robot::Robot;

/// A per-dispatch helper bound to a message and its match.
#[derive(Clone)]
pub struct Response {
    robot: Robot,
    message: Arc<Message>,
    matched: Option<Match>,
}

impl Response {
    /// Creates a response for `message`.
    pub fn new(robot: Robot, message: Arc<Message>, matched: Option<Match>) -> Self {
        Self {
            robot,
            message,
            matched,
        }
    }

    /// Returns the robot this response belongs to.
    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    /// Returns the message being responded to.
    pub fn message(&self) -> &Arc<Message> {
        &self.message
    }

    pub(crate) fn message_mut(&mut self) -> &mut Message {
        Arc::make_mut(&mut self.message)
    }

    /// Returns the listener match, if the response was created for one.
    pub fn matched(&self) -> Option<&Match> {
        self.matched.as_ref()
    }

    /// Returns capture group `index` of the listener match.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.matched.as_ref().and_then(|m| m.get(index))
    }

    /// Returns the routing information for outbound calls.
    pub fn envelope(&self) -> Envelope {
        Envelope::for_message(Arc::clone(&self.message))
    }

    /// Posts strings to the room.
    pub async fn send<I, S>(&self, strings: I) -> PipelineOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deliver(ResponseMethod::Send, strings).await
    }

    /// Posts strings as an emote.
    pub async fn emote<I, S>(&self, strings: I) -> PipelineOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deliver(ResponseMethod::Emote, strings).await
    }

    /// Posts strings addressed to the sender.
    pub async fn reply<I, S>(&self, strings: I) -> PipelineOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deliver(ResponseMethod::Reply, strings).await
    }

    /// Sets the room topic.
    pub async fn topic<I, S>(&self, strings: I) -> PipelineOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deliver(ResponseMethod::Topic, strings).await
    }

    /// Plays sounds.
    pub async fn play<I, S>(&self, strings: I) -> PipelineOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deliver(ResponseMethod::Play, strings).await
    }

    /// Posts strings to an unlogged room.
    pub async fn locked<I, S>(&self, strings: I) -> PipelineOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deliver(ResponseMethod::Locked, strings).await
    }

    async fn deliver<I, S>(&self, method: ResponseMethod, strings: I) -> PipelineOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let strings = strings.into_iter().map(Into::into).collect();
        self.run_with_middleware(method, method.is_plaintext(), strings)
            .await
    }

    /// Runs `strings` through the response middleware and hands whatever is
    /// left to the adapter.
    ///
    /// Resolves once delivery finished and the middleware cleanups ran.
    /// Delivery failures are reported to the robot's error handlers.
    pub async fn run_with_middleware(
        &self,
        method: ResponseMethod,
        plaintext: bool,
        strings: Vec<String>,
    ) -> PipelineOutcome {
        debug!(method = %method, count = strings.len(), "Running response middleware");

        let mut ctx = ResponseContext {
            response: self.clone(),
            strings,
            method,
            plaintext,
        };
        let adapter = Arc::clone(self.robot.adapter());

        self.robot
            .response_pipeline()
            .execute(&mut ctx, move |ctx: &mut ResponseContext| {
                Box::pin(async move {
                    let envelope = ctx.response.envelope();
                    ctx.method
                        .deliver(adapter.as_ref(), &envelope, &ctx.strings)
                        .await
                        .map_err(BotError::from)
                })
            })
            .await
    }

    /// Picks a random element of `items`.
    pub fn random<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut rand::rng())
    }

    /// Marks the message as handled; no further listener will see it.
    pub fn finish(&self) {
        self.message.finish();
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("robot", &self.robot.name())
            .field("message", &self.message)
            .field("matched", &self.matched)
            .finish()
    }
}

/// The context the response pipeline runs over.
#[derive(Debug)]
pub struct ResponseContext {
    /// The response performing the outbound call.
    pub response: Response,
    /// The strings to deliver. Middleware may rewrite them.
    pub strings: Vec<String>,
    /// The outbound operation.
    pub method: ResponseMethod,
    /// Whether the strings are plain text.
    pub plaintext: bool,
}

impl PipelineContext for ResponseContext {
    fn response(&self) -> Option<&Response> {
        Some(&self.response)
    }
}
