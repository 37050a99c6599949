use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A new message was posted (or forwarded) into a conversation
    MessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        content: String,
        reply_to_message_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    },

    /// A message was edited by its sender
    MessageUpdate {
        id: Uuid,
        conversation_id: Uuid,
        content: String,
        edited_at: DateTime<Utc>,
    },

    /// A message was soft-deleted
    MessageDelete { id: Uuid, conversation_id: Uuid },

    ReactionAdd {
        message_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },

    ReactionRemove {
        message_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },

    TypingStart {
        conversation_id: Uuid,
        user_id: Uuid,
        name: String,
    },

    TypingStop { conversation_id: Uuid, user_id: Uuid },

    /// A participant read the conversation up to a message
    ReadReceipt {
        conversation_id: Uuid,
        user_id: Uuid,
        last_read_message_id: Option<Uuid>,
        read_at: DateTime<Utc>,
    },

    /// The recipient was added to a new conversation
    ConversationCreate { conversation_id: Uuid },

    /// A member left a group
    MemberLeave { conversation_id: Uuid, user_id: Uuid },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        online: bool,
        last_seen_at: DateTime<Utc>,
    },
}

impl GatewayEvent {
    /// Returns the conversation this event belongs to.
    /// Events that return `None` are global and go to every connected client.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { conversation_id, .. }
            | Self::MessageUpdate { conversation_id, .. }
            | Self::MessageDelete { conversation_id, .. }
            | Self::ReactionAdd { conversation_id, .. }
            | Self::ReactionRemove { conversation_id, .. }
            | Self::TypingStart { conversation_id, .. }
            | Self::TypingStop { conversation_id, .. }
            | Self::ReadReceipt { conversation_id, .. }
            | Self::ConversationCreate { conversation_id }
            | Self::MemberLeave { conversation_id, .. } => Some(*conversation_id),
            Self::Ready { .. } | Self::PresenceUpdate { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Keep the user's presence fresh
    Heartbeat,

    StartTyping { conversation_id: Uuid },

    StopTyping { conversation_id: Uuid },
}
