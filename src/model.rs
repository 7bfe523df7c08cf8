use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReactionKind {
    #[default]
    Like,
}

/// Actor ids per reaction kind. A set, so an actor reacts at most once per kind.
pub type Reactions = BTreeMap<ReactionKind, BTreeSet<String>>;

/// Pagination marker naming the last item the backend evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub timestamp: i64,
    pub id: String,
}

impl Cursor {
    pub fn new(timestamp: i64, id: impl Into<String>) -> Self {
        Self {
            timestamp,
            id: id.into(),
        }
    }

    /// A cursor only exists when the backend returned both halves.
    pub fn from_parts(timestamp: Option<i64>, id: Option<String>) -> Option<Self> {
        match (timestamp, id) {
            (Some(timestamp), Some(id)) if !id.is_empty() => Some(Self { timestamp, id }),
            _ => None,
        }
    }
}

/// Anything the cursor machinery can page through.
pub trait Entry {
    fn id(&self) -> &str;
    fn timestamp(&self) -> i64;

    fn cursor(&self) -> Cursor {
        Cursor::new(self.timestamp(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_profile_img_url: String,
    #[serde(default)]
    pub texts: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub reactions: Reactions,
}

impl Post {
    pub fn has_reacted(&self, actor_id: &str, kind: ReactionKind) -> bool {
        self.reactions
            .get(&kind)
            .is_some_and(|actors| actors.contains(actor_id))
    }

    pub fn reaction_count(&self, kind: ReactionKind) -> usize {
        self.reactions.get(&kind).map_or(0, BTreeSet::len)
    }

    /// Flips the actor's membership for `kind` and returns the new membership.
    pub fn toggle_reaction(&mut self, actor_id: &str, kind: ReactionKind) -> bool {
        let actors = self.reactions.entry(kind).or_default();
        if actors.remove(actor_id) {
            if actors.is_empty() {
                self.reactions.remove(&kind);
            }
            false
        } else {
            actors.insert(actor_id.to_string());
            true
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        created_at(self.timestamp)
    }
}

impl Entry for Post {
    fn id(&self) -> &str {
        &self.post_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_profile_img_url: String,
    #[serde(default)]
    pub texts: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl Comment {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        created_at(self.timestamp)
    }
}

impl Entry for Comment {
    fn id(&self) -> &str {
        &self.comment_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

fn created_at(timestamp: i64) -> Option<DateTime<Utc>> {
    if timestamp == 0 {
        return None;
    }
    Utc.timestamp_opt(timestamp, 0).single()
}

/// One page of results. `next_cursor` is `None` once nothing is left.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn with_cursor(items: Vec<T>, next_cursor: Cursor) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor),
        }
    }
}

/// Body sent when creating a post or a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub uuid: String,
    pub user_name: String,
    pub user_profile_img_url: String,
    pub texts: String,
}
