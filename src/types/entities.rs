//! REST entities carried inside stream payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Mastodon account as embedded in statuses and notifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub acct: String,
    pub display_name: String,
    pub locked: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub followers_count: u64,
    pub following_count: u64,
    pub statuses_count: u64,
    pub note: String,
    pub url: String,
    pub avatar: String,
    pub avatar_static: String,
    pub header: String,
    pub header_static: String,
}

/// Who can see a status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
    /// Values from forks and newer servers (`local`, `limited`, ...)
    #[serde(other)]
    Other,
}

/// A published (or boosted) status
///
/// Only `id` is required on the wire; every other field falls back to its
/// default so partial payloads from older servers still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub id: String,
    pub uri: String,
    pub url: Option<String>,
    pub account: Account,
    pub in_reply_to_id: Option<String>,
    /// The boosted status when this status is a reblog
    pub reblog: Option<Box<Status>>,
    /// HTML body
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub visibility: Visibility,
    pub sensitive: bool,
    pub spoiler_text: String,
    pub reblogs_count: u64,
    pub favourites_count: u64,
    pub replies_count: u64,
    pub language: Option<String>,
}

impl Status {
    /// The status whose content should be shown: the boosted one for reblogs.
    pub fn original(&self) -> &Status {
        self.reblog.as_deref().unwrap_or(self)
    }
}

/// Kind of a notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Mention,
    Reblog,
    Favourite,
    Follow,
    FollowRequest,
    Poll,
    Status,
    Update,
    /// Kinds introduced by newer servers
    #[serde(other)]
    Other,
}

/// A mention, follow, favourite or boost alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub created_at: Option<DateTime<Utc>>,
    pub account: Account,
    pub status: Option<Status>,
}
