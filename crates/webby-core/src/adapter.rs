//! Adapter capability.
//!
//! An adapter connects the robot to a concrete chat source. It delivers
//! outbound strings for the robot and feeds inbound events back by calling
//! [`Robot::receive`](crate::robot::Robot::receive) on the handle it is given
//! in [`Adapter::run`].
//!
//! ```rust,ignore
//! struct Console;
//!
//! #[async_trait]
//! impl Adapter for Console {
//!     fn name(&self) -> &str {
//!         "console"
//!     }
//!
//!     async fn send(&self, _envelope: &Envelope, strings: &[String]) -> AdapterResult<()> {
//!         for line in strings {
//!             println!("{line}");
//!         }
//!         Ok(())
//!     }
//!
//!     async fn reply(&self, envelope: &Envelope, strings: &[String]) -> AdapterResult<()> {
//!         let lines: Vec<String> = strings
//!             .iter()
//!             .map(|s| format!("{}: {s}", envelope.user.name))
//!             .collect();
//!         self.send(envelope, &lines).await
//!     }
//!
//!     async fn run(&self, robot: Robot) -> AdapterResult<()> {
//!         // read lines, build messages, robot.receive(message).await
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AdapterError, AdapterResult};
use crate::message::Message;
use crate::robot::Robot;
use crate::user::User;

/// The routing information handed to an adapter with every outbound call.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The room to deliver to.
    pub room: Option<String>,
    /// The user the outbound message concerns.
    pub user: Arc<User>,
    /// The message being responded to.
    pub message: Arc<Message>,
}

impl Envelope {
    /// Builds the envelope for a response to `message`.
    pub fn for_message(message: Arc<Message>) -> Self {
        Self {
            room: message.room().map(str::to_string),
            user: Arc::clone(message.user()),
            message,
        }
    }
}

/// The outbound operations a response can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseMethod {
    /// Post strings to the room.
    Send,
    /// Post strings as an emote / action.
    Emote,
    /// Post strings addressed to the user.
    Reply,
    /// Change the room topic.
    Topic,
    /// Play sounds.
    Play,
    /// Post strings to an unlogged room.
    Locked,
}

impl ResponseMethod {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Emote => "emote",
            Self::Reply => "reply",
            Self::Topic => "topic",
            Self::Play => "play",
            Self::Locked => "locked",
        }
    }

    /// Returns whether strings delivered with this method are plain text.
    pub fn is_plaintext(&self) -> bool {
        !matches!(self, Self::Play)
    }

    /// Calls the matching adapter operation.
    pub async fn deliver(
        self,
        adapter: &dyn Adapter,
        envelope: &Envelope,
        strings: &[String],
    ) -> AdapterResult<()> {
        match self {
            Self::Send => adapter.send(envelope, strings).await,
            Self::Emote => adapter.emote(envelope, strings).await,
            Self::Reply => adapter.reply(envelope, strings).await,
            Self::Topic => adapter.topic(envelope, strings).await,
            Self::Play => adapter.play(envelope, strings).await,
            Self::Locked => adapter.locked(envelope, strings).await,
        }
    }
}

impl fmt::Display for ResponseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chat source capability consumed by the robot.
///
/// Only [`send`](Self::send) is mandatory. `emote` and `locked` fall back to
/// `send`; `reply`, `topic` and `play` report [`AdapterError::NotSupported`]
/// unless overridden. Callers of [`Response::reply`](crate::Response::reply)
/// and friends do not see that error directly: it is delivered to the robot's
/// error handlers, and subscribers get a [`RobotEvent::Error`](crate::RobotEvent).
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Returns the adapter name (used in logs).
    fn name(&self) -> &str;

    /// Posts strings to the chat source.
    async fn send(&self, envelope: &Envelope, strings: &[String]) -> AdapterResult<()>;

    /// Posts an emote. Defaults to [`send`](Self::send).
    async fn emote(&self, envelope: &Envelope, strings: &[String]) -> AdapterResult<()> {
        self.send(envelope, strings).await
    }

    /// Posts strings mentioning the envelope's user.
    ///
    /// Defaults to [`AdapterError::NotSupported`].
    async fn reply(&self, _envelope: &Envelope, _strings: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("reply"))
    }

    /// Sets the room topic.
    async fn topic(&self, _envelope: &Envelope, _strings: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("topic"))
    }

    /// Plays sounds.
    async fn play(&self, _envelope: &Envelope, _strings: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("play"))
    }

    /// Posts strings to an unlogged room. Defaults to [`send`](Self::send).
    async fn locked(&self, envelope: &Envelope, strings: &[String]) -> AdapterResult<()> {
        self.send(envelope, strings).await
    }

    /// Starts the adapter. Inbound events go to `robot.receive(..)`.
    ///
    /// May return immediately after spawning its own tasks, or run until the
    /// chat source disconnects.
    async fn run(&self, robot: Robot) -> AdapterResult<()>;

    /// Shuts the adapter down.
    async fn close(&self) -> AdapterResult<()> {
        Ok(())
    }
}

/// A shared, type-erased adapter.
pub type BoxedAdapter = Arc<dyn Adapter>;
