use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Anything that lives in a paged list. Ids are unique within one list.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Fresh client-side id for optimistically created items.
pub fn local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Bearer token plus the identity it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub subject_id: String,
    pub display_name: String,
    pub email: String,
    pub token: String,
}

/// `user` object of the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct WireUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEnvelope {
    #[serde(default)]
    #[allow(dead_code)]
    pub message: String,
    pub user: WireUser,
}

impl From<WireUser> for Credential {
    fn from(user: WireUser) -> Self {
        Self {
            subject_id: user.id,
            display_name: user.username,
            email: user.email,
            token: user.token,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Rewrite,
    Expand,
    Shorten,
    Article,
    Summary,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Rewrite,
        Category::Expand,
        Category::Shorten,
        Category::Article,
        Category::Summary,
    ];

    pub fn as_api_str(&self) -> &'static str {
        match self {
            Category::Rewrite => "rewrite",
            Category::Expand => "expand",
            Category::Shorten => "shorten",
            Category::Article => "article",
            Category::Summary => "summary",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_api_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

/// Lifecycle of a message shown in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Authored locally, server has not answered yet.
    Pending,
    Confirmed,
    /// The server rejected it. Kept visible so the text is not lost.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub category: Option<Category>,
    pub status: MessageStatus,
}

impl Message {
    pub fn pending_user(text: impl Into<String>, category: Category) -> Self {
        Self {
            id: local_id(),
            role: Role::User,
            text: text.into(),
            category: Some(category),
            status: MessageStatus::Pending,
        }
    }

    pub fn confirmed(role: Role, text: impl Into<String>, category: Option<Category>) -> Self {
        Self {
            id: local_id(),
            role,
            text: text.into(),
            category,
            status: MessageStatus::Confirmed,
        }
    }
}

impl Identified for Message {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

impl Identified for SessionSummary {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One prompt/answer row of a chat session as stored by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for ImageRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Square,
    Landscape,
    Portrait,
    Wide,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Square,
        Resolution::Landscape,
        Resolution::Portrait,
        Resolution::Wide,
    ];

    pub fn as_api_str(&self) -> &'static str {
        match self {
            Resolution::Square => "1024x1024",
            Resolution::Landscape => "1024x768",
            Resolution::Portrait => "768x1024",
            Resolution::Wide => "1280x720",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolution::ALL
            .into_iter()
            .find(|r| r.as_api_str() == s.trim())
            .ok_or_else(|| format!("unsupported resolution '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_user_maps_to_credential() {
        let json = r#"{"message":"ok","user":{"_id":"u1","username":"ada","email":"a@b.c","token":"t1"}}"#;
        let env: UserEnvelope = serde_json::from_str(json).unwrap();
        let cred = Credential::from(env.user);
        assert_eq!(cred.subject_id, "u1");
        assert_eq!(cred.display_name, "ada");
        assert_eq!(cred.token, "t1");
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Expand".parse::<Category>().unwrap(), Category::Expand);
        assert!("poem".parse::<Category>().is_err());
    }

    #[test]
    fn image_record_accepts_missing_created_at() {
        let rec: ImageRecord =
            serde_json::from_str(r#"{"_id":"i1","prompt":"cat","urls":["a"]}"#).unwrap();
        assert_eq!(rec.created_at, None);
        assert_eq!(rec.urls, vec!["a".to_string()]);
    }

    #[test]
    fn local_ids_are_unique() {
        assert_ne!(local_id(), local_id());
    }
}
