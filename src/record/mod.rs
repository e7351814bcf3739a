//! Archived record types
//!
//! Every key in the store maps to one [`Record`]. The serde layout here is the wire
//! format of both the record store and the packed chunks, so field names and tags are
//! part of the archive format.

mod key;

pub use key::{Key, KeyKind};

use serde::{Deserialize, Serialize};

/// Persisted value for a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    /// A forum listing, accumulated across all of its pages
    Forum { title: String, items: Vec<Item> },

    /// A topic, with posts from every page in page order
    Topic { items: Vec<Post> },
}

impl Record {
    /// Number of listing items or posts in this record
    pub fn len(&self) -> usize {
        match self {
            Self::Forum { items, .. } => items.len(),
            Self::Topic { items } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys this record links to, in display order
    pub fn child_keys(&self) -> Vec<&Key> {
        match self {
            Self::Forum { items, .. } => items.iter().filter_map(Item::target_key).collect(),
            Self::Topic { .. } => Vec::new(),
        }
    }
}

/// One entry in a forum listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Item {
    /// Child forum rendered as a section of its parent instead of a row
    InlineForum { title: String, target_key: Key },

    /// Non-navigable section header
    Group { title: String },

    Forum {
        title: String,
        description: String,
        target_key: Key,
    },

    /// Off-site or redirecting link; never crawled
    Redirect {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        target_url: String,
    },

    Topic {
        title: String,
        target_key: Key,
        user_id: i64,
        user_name: String,
        datetime: String,
    },
}

impl Item {
    pub fn title(&self) -> &str {
        match self {
            Self::InlineForum { title, .. }
            | Self::Group { title }
            | Self::Forum { title, .. }
            | Self::Redirect { title, .. }
            | Self::Topic { title, .. } => title,
        }
    }

    /// The crawled key this item points at, if any
    pub fn target_key(&self) -> Option<&Key> {
        match self {
            Self::InlineForum { target_key, .. }
            | Self::Forum { target_key, .. }
            | Self::Topic { target_key, .. } => Some(target_key),
            Self::Group { .. } | Self::Redirect { .. } => None,
        }
    }
}

/// One message within a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    /// Poster's profile id, `-1` for guests
    pub user_id: i64,
    pub user_name: String,
    pub datetime: String,
    pub post_id: u64,
    /// HTML fragment of the post body
    pub content: String,
}
