//! Row types returned by the store. All timestamps are epoch milliseconds.
//! Distinct from parley-types wire models to keep the DB layer independent.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub email: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct UserBriefRow {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LastMessageRow {
    pub content: String,
    pub sender_id: Uuid,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct ConversationSummaryRow {
    pub conversation_id: Uuid,
    pub is_group: bool,
    pub name: String,
    pub member_count: usize,
    pub other_user: Option<UserBriefRow>,
    pub last_message: Option<LastMessageRow>,
    pub unread_count: u32,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ConversationDetailRow {
    pub conversation_id: Uuid,
    pub is_group: bool,
    pub name: String,
    pub member_count: usize,
    pub other_user: Option<UserBriefRow>,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub last_read_message_id: Option<Uuid>,
    pub last_read_at: Option<i64>,
    pub unread_count: u32,
    pub joined_at: i64,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// Already masked when `deleted` is set.
    pub content: String,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub edited_at: Option<i64>,
    pub reply_to_message_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ReplyPreviewRow {
    pub content: String,
    pub sender_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStatusRow {
    pub delivered: bool,
    pub seen: bool,
}

/// A message joined with everything the chat view renders.
#[derive(Debug, Clone)]
pub struct MessageViewRow {
    pub message: MessageRow,
    pub sender_name: String,
    pub sender_image_url: Option<String>,
    pub reply_to: Option<ReplyPreviewRow>,
    pub read_status: Option<ReadStatusRow>,
}

#[derive(Debug, Clone)]
pub struct MessagePageRow {
    pub messages: Vec<MessageViewRow>,
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SearchHitRow {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub created_at: i64,
    pub edited_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSummaryRow {
    pub emoji: String,
    pub count: usize,
    pub has_reacted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceRow {
    pub user_id: Uuid,
    pub last_seen_at: i64,
    pub online: bool,
}

/// Someone currently typing in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingRow {
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PushTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
