use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Usernames that have liked a clip, kept in the order they liked it.
///
/// Older data files stored the like count as a plain number. Anything that
/// is not an array loads as an empty set; non-string array entries are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Likes(Vec<String>);

impl Likes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.0.iter().any(|u| u == username)
    }

    /// Adds the user if absent, removes them if present. Returns whether the
    /// user likes the clip afterwards.
    pub fn toggle(&mut self, username: &str) -> bool {
        if self.contains(username) {
            self.0.retain(|u| u != username);
            false
        } else {
            self.0.push(username.to_string());
            true
        }
    }
}

impl<'de> Deserialize<'de> for Likes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Value::Array(entries) = Value::deserialize(deserializer)? else {
            return Ok(Likes::default());
        };

        let mut likes = Likes(Vec::with_capacity(entries.len()));
        for entry in entries {
            if let Value::String(username) = entry {
                if !likes.contains(&username) {
                    likes.0.push(username);
                }
            }
        }
        Ok(likes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(rename = "videoURL", default)]
    pub video_url: String,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: Likes,
}

/// Metadata supplied alongside an uploaded clip file.
#[derive(Debug, Clone, Default)]
pub struct NewClip {
    pub title: String,
    pub category: String,
    pub tags: String,
    pub uploader: String,
}

impl Clip {
    pub fn new(id: String, meta: NewClip, video_url: String) -> Self {
        Self {
            id,
            title: meta.title,
            category: meta.category,
            tags: meta.tags,
            uploader: meta.uploader,
            video_url,
            views: 0,
            likes: Likes::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Like,
    /// Any other `type`, including non-strings and `null`.
    #[default]
    Unknown,
}

impl<'de> Deserialize<'de> for InteractionKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(kind) if kind == "view" => Self::View,
            Value::String(kind) if kind == "like" => Self::Like,
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractRequest {
    #[serde(rename = "type", default)]
    pub kind: InteractionKind,
    #[serde(default)]
    pub username: Option<String>,
}

/// Counters after an interaction. `likes` is the number of users, never the
/// users themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionCounts {
    pub views: u64,
    pub likes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InteractResponse {
    pub success: bool,
    pub views: u64,
    pub likes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
