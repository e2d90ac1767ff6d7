//! Chat users.
//!
//! A [`User`] is an identity record keyed by an opaque [`UserId`]. Records are
//! owned by the [`Brain`](crate::brain::Brain) and handed out as `Arc<User>`;
//! they are never mutated in place; a lookup with a different room replaces
//! the stored record instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque user identifier, either textual or numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    /// A numeric id.
    Int(i64),
    /// A textual id.
    Str(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// Attributes supplied when a user is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserOptions {
    /// Display name; defaults to the stringified id.
    #[serde(default)]
    pub name: Option<String>,
    /// The room or channel the user was seen in.
    #[serde(default)]
    pub room: Option<String>,
    /// Any further adapter-specific attributes.
    #[serde(default, flatten)]
    pub attributes: Map<String, Value>,
}

impl UserOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the room.
    pub fn room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Adds an arbitrary attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A user of the chat source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The opaque id.
    pub id: UserId,
    /// The display name.
    pub name: String,
    /// The room the user was last seen in, if the adapter reports one.
    #[serde(default)]
    pub room: Option<String>,
    /// Additional attributes.
    #[serde(default, flatten)]
    pub attributes: Map<String, Value>,
}

impl User {
    /// Creates a user from an id and creation options.
    pub fn new(id: impl Into<UserId>, options: UserOptions) -> Self {
        let id = id.into();
        let name = options.name.unwrap_or_else(|| id.to_string());
        Self {
            id,
            name,
            room: options.room,
            attributes: options.attributes,
        }
    }

    /// Returns an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_defaults_to_id() {
        let user = User::new("Fake User", UserOptions::new());
        assert_eq!(user.name, "Fake User");

        let user = User::new(42, UserOptions::new());
        assert_eq!(user.name, "42");
    }

    #[test]
    fn options_are_copied_onto_the_user() {
        let user = User::new(
            "1",
            UserOptions::new()
                .name("Alice")
                .room("#general")
                .attribute("email", "alice@example.com"),
        );
        assert_eq!(user.name, "Alice");
        assert_eq!(user.room.as_deref(), Some("#general"));
        assert_eq!(
            user.attribute("email"),
            Some(&Value::from("alice@example.com"))
        );
    }

    #[test]
    fn ids_deserialize_untagged() {
        let ids: Vec<UserId> = serde_json::from_str(r#"[1, "two"]"#).unwrap();
        assert_eq!(ids, vec![UserId::Int(1), UserId::Str("two".into())]);
    }
}
