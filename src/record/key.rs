//! Crawl keys
//!
//! A key names one node of the forum tree and doubles as its storage key:
//! `root`, `f{forum}` or `f{forum}t{topic}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The shape of a key, recovered by [`Key::kind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// The board index
    Root,

    /// A forum listing
    Forum { forum: u64 },

    /// A topic inside a forum
    Topic { forum: u64, topic: u64 },
}

/// Stable identifier for a forum or topic node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// The key of the board index page
    pub fn root() -> Self {
        Self("root".to_string())
    }

    pub fn forum(forum: u64) -> Self {
        Self(format!("f{}", forum))
    }

    pub fn topic(forum: u64, topic: u64) -> Self {
        Self(format!("f{}t{}", forum, topic))
    }

    /// Wraps an arbitrary string without checking its shape
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classifies the key, returning None if it is not one of the three known shapes
    pub fn kind(&self) -> Option<KeyKind> {
        if self.0 == "root" {
            return Some(KeyKind::Root);
        }

        let rest = self.0.strip_prefix('f')?;
        match rest.split_once('t') {
            Some((forum, topic)) => Some(KeyKind::Topic {
                forum: parse_id(forum)?,
                topic: parse_id(topic)?,
            }),
            None => Some(KeyKind::Forum {
                forum: parse_id(rest)?,
            }),
        }
    }

    /// Parses and validates a key string
    pub fn parse(raw: &str) -> Option<Self> {
        let key = Self::from_raw(raw);
        key.kind().map(|_| key)
    }
}

fn parse_id(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
