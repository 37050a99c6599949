use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The slice of a user shown next to conversations and member lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBrief {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One row of the sidebar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub is_group: bool,
    pub name: String,
    pub member_count: usize,
    /// Set for 1:1 conversations only.
    pub other_user: Option<UserBrief>,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation_id: Uuid,
    pub is_group: bool,
    pub name: String,
    pub member_count: usize,
    pub other_user: Option<UserBrief>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub content: String,
    pub sender_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReadStatus {
    pub delivered: bool,
    pub seen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_image_url: Option<String>,
    pub content: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub reply_to_message_id: Option<Uuid>,
    pub reply_to: Option<ReplyPreview>,
    /// Only present on the caller's own, non-deleted messages.
    pub read_status: Option<ReadStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    /// Oldest first.
    pub messages: Vec<Message>,
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub has_reacted: bool,
}

pub type ReactionMap = HashMap<Uuid, Vec<ReactionSummary>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub online: bool,
    pub last_seen_at: DateTime<Utc>,
}

pub type PresenceMap = HashMap<Uuid, PresenceStatus>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingUser {
    pub id: Uuid,
    pub name: String,
}
