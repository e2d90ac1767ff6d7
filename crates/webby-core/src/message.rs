//! Inbound messages.
//!
//! A [`Message`] is one event observed by an adapter: a line of text, a user
//! entering or leaving a room, or a topic change. The dispatch engine itself
//! produces [`MessageKind::CatchAll`] when no listener handled a message.
//!
//! Message kinds are a closed enum; listeners match on the kind instead of
//! inspecting concrete types.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;

use crate::user::User;

/// The payload of a [`Message`], tagged by kind.
#[derive(Debug, Clone)]
pub enum MessageKind {
    /// A line of chat text.
    Text {
        /// The message text.
        text: String,
        /// The adapter's id for the message, if it has one.
        id: Option<String>,
    },
    /// A user entered the room.
    Enter,
    /// A user left the room.
    Leave,
    /// The room topic changed.
    Topic {
        /// The new topic.
        text: String,
    },
    /// No listener handled the wrapped message.
    CatchAll(Arc<Message>),
}

impl MessageKind {
    /// Returns a short name for the kind, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Enter => "enter",
            Self::Leave => "leave",
            Self::Topic { .. } => "topic",
            Self::CatchAll(_) => "catch_all",
        }
    }
}

/// An inbound event from the chat source.
///
/// The `done` flag is the only mutable state; it is set through
/// [`finish`](Self::finish) and stops the dispatch loop from invoking any
/// further listener for this message.
#[derive(Debug)]
pub struct Message {
    user: Arc<User>,
    room: Option<String>,
    kind: MessageKind,
    done: AtomicBool,
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            user: Arc::clone(&self.user),
            room: self.room.clone(),
            kind: self.kind.clone(),
            done: AtomicBool::new(self.is_done()),
        }
    }
}

impl Message {
    fn new(user: Arc<User>, kind: MessageKind) -> Self {
        let room = user.room.clone();
        Self {
            user,
            room,
            kind,
            done: AtomicBool::new(false),
        }
    }

    /// Creates a text message.
    pub fn new_text(user: Arc<User>, text: impl Into<String>) -> Self {
        Self::new(
            user,
            MessageKind::Text {
                text: text.into(),
                id: None,
            },
        )
    }

    /// Creates a text message carrying the adapter's message id.
    pub fn new_text_with_id(
        user: Arc<User>,
        text: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::new(
            user,
            MessageKind::Text {
                text: text.into(),
                id: Some(id.into()),
            },
        )
    }

    /// Creates an enter notification.
    pub fn enter(user: Arc<User>) -> Self {
        Self::new(user, MessageKind::Enter)
    }

    /// Creates a leave notification.
    pub fn leave(user: Arc<User>) -> Self {
        Self::new(user, MessageKind::Leave)
    }

    /// Creates a topic change notification.
    pub fn topic(user: Arc<User>, text: impl Into<String>) -> Self {
        Self::new(user, MessageKind::Topic { text: text.into() })
    }

    /// Wraps a message nobody handled. The wrapper takes its user and room
    /// from the inner message.
    pub fn catch_all(inner: Arc<Message>) -> Self {
        Self {
            user: Arc::clone(&inner.user),
            room: inner.room.clone(),
            kind: MessageKind::CatchAll(inner),
            done: AtomicBool::new(false),
        }
    }

    /// Returns the sender.
    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    /// Returns the room the message was sent in.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Returns the message kind.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Returns the text of a text or topic message.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Text { text, .. } | MessageKind::Topic { text } => Some(text),
            _ => None,
        }
    }

    /// Returns a mutable handle to the text of a text message.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match &mut self.kind {
            MessageKind::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Returns the adapter's message id for text messages.
    pub fn id(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Text { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` for text messages.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, MessageKind::Text { .. })
    }

    /// Returns `true` for enter notifications.
    pub fn is_enter(&self) -> bool {
        matches!(self.kind, MessageKind::Enter)
    }

    /// Returns `true` for leave notifications.
    pub fn is_leave(&self) -> bool {
        matches!(self.kind, MessageKind::Leave)
    }

    /// Returns `true` for topic notifications.
    pub fn is_topic(&self) -> bool {
        matches!(self.kind, MessageKind::Topic { .. })
    }

    /// Returns `true` for messages produced by the catch-all fallback.
    pub fn is_catch_all(&self) -> bool {
        matches!(self.kind, MessageKind::CatchAll(_))
    }

    /// Returns the wrapped message of a catch-all message.
    pub fn inner(&self) -> Option<&Arc<Message>> {
        match &self.kind {
            MessageKind::CatchAll(inner) => Some(inner),
            _ => None,
        }
    }

    /// Matches a text message against `pattern`.
    ///
    /// Returns `None` for non-text messages.
    pub fn match_pattern(&self, pattern: &Regex) -> Option<Match> {
        let MessageKind::Text { text, .. } = &self.kind else {
            return None;
        };
        pattern.captures(text).map(|caps| Match::from_captures(&caps))
    }

    /// Marks the message as handled; no further listener will see it.
    pub fn finish(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`finish`](Self::finish) was called.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MessageKind::Text { text, .. } => f.write_str(text),
            MessageKind::Enter => write!(f, "{} entered", self.user.name),
            MessageKind::Leave => write!(f, "{} left", self.user.name),
            MessageKind::Topic { text } => write!(f, "topic: {text}"),
            MessageKind::CatchAll(inner) => fmt::Display::fmt(inner.as_ref(), f),
        }
    }
}

/// The result of a successful listener match.
///
/// Regex matchers fill in the capture groups, with group 0 holding the whole
/// match. Kind matchers (enter, leave, ...) produce an empty match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    groups: Vec<Option<String>>,
}

impl Match {
    /// Creates a match without capture groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the groups out of a regex match.
    pub fn from_captures(captures: &regex::Captures<'_>) -> Self {
        Self {
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// Returns capture group `index`, if it participated in the match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|group| group.as_deref())
    }

    /// Returns the number of groups, including group 0.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` for a match without capture groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::UserOptions;

    fn user() -> Arc<User> {
        Arc::new(User::new("1", UserOptions::new().name("node").room("#test")))
    }

    #[test]
    fn room_is_copied_from_the_user() {
        let message = Message::new_text(user(), "hi");
        assert_eq!(message.room(), Some("#test"));
    }

    #[test]
    fn finish_marks_done() {
        let message = Message::enter(user());
        assert!(!message.is_done());
        message.finish();
        assert!(message.is_done());
    }

    #[test]
    fn text_messages_match_patterns() {
        let message = Message::new_text(user(), "message123");
        let pattern = Regex::new(r"^message(\d+)$").unwrap();
        let matched = message.match_pattern(&pattern).unwrap();
        assert_eq!(matched.get(0), Some("message123"));
        assert_eq!(matched.get(1), Some("123"));

        let pattern = Regex::new(r"^nope$").unwrap();
        assert!(message.match_pattern(&pattern).is_none());
    }

    #[test]
    fn other_kinds_never_match_patterns() {
        let pattern = Regex::new(".*").unwrap();
        assert!(Message::enter(user()).match_pattern(&pattern).is_none());
        assert!(Message::topic(user(), "t").match_pattern(&pattern).is_none());
    }

    #[test]
    fn catch_all_wraps_without_sharing_done() {
        let inner = Arc::new(Message::new_text(user(), "pong"));
        let wrapped = Message::catch_all(Arc::clone(&inner));
        assert!(wrapped.is_catch_all());
        assert_eq!(wrapped.room(), Some("#test"));
        assert_eq!(wrapped.inner().and_then(|m| m.text()), Some("pong"));
        wrapped.finish();
        assert!(!inner.is_done());
    }

    #[test]
    fn displays_text_messages_as_their_text() {
        assert_eq!(Message::new_text(user(), "hello").to_string(), "hello");
    }
}
