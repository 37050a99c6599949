//! Store rows to wire models.

use parley_db::models::{
    ConversationDetailRow, ConversationSummaryRow, MessageViewRow, SearchHitRow, UserBriefRow,
    UserRow,
};
use parley_types::models::{
    ConversationDetail, ConversationSummary, LastMessage, Message, ReadStatus, ReplyPreview,
    SearchHit, User, UserBrief,
};
use parley_types::time::from_millis;

pub fn user(row: UserRow) -> User {
    User {
        id: row.id,
        name: row.name,
        image_url: row.image_url,
        email: row.email,
        created_at: from_millis(row.created_at),
        updated_at: from_millis(row.updated_at),
    }
}

pub fn user_brief(row: UserBriefRow) -> UserBrief {
    UserBrief {
        id: row.id,
        name: row.name,
        image_url: row.image_url,
    }
}

pub fn conversation_summary(row: ConversationSummaryRow) -> ConversationSummary {
    ConversationSummary {
        conversation_id: row.conversation_id,
        is_group: row.is_group,
        name: row.name,
        member_count: row.member_count,
        other_user: row.other_user.map(user_brief),
        last_message: row.last_message.map(|m| LastMessage {
            content: m.content,
            sender_id: m.sender_id,
            created_at: from_millis(m.created_at),
        }),
        unread_count: row.unread_count,
        updated_at: from_millis(row.updated_at),
    }
}

pub fn conversation_detail(row: ConversationDetailRow) -> ConversationDetail {
    ConversationDetail {
        conversation_id: row.conversation_id,
        is_group: row.is_group,
        name: row.name,
        member_count: row.member_count,
        other_user: row.other_user.map(user_brief),
    }
}

pub fn message(row: MessageViewRow) -> Message {
    let m = row.message;
    Message {
        id: m.id,
        conversation_id: m.conversation_id,
        sender_id: m.sender_id,
        sender_name: row.sender_name,
        sender_image_url: row.sender_image_url,
        content: m.content,
        deleted: m.deleted,
        created_at: from_millis(m.created_at),
        edited_at: m.edited_at.map(from_millis),
        reply_to_message_id: m.reply_to_message_id,
        reply_to: row.reply_to.map(|r| ReplyPreview {
            content: r.content,
            sender_name: r.sender_name,
        }),
        read_status: row.read_status.map(|s| ReadStatus {
            delivered: s.delivered,
            seen: s.seen,
        }),
    }
}

pub fn search_hit(row: SearchHitRow) -> SearchHit {
    SearchHit {
        id: row.id,
        content: row.content,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        created_at: from_millis(row.created_at),
        edited_at: row.edited_at.map(from_millis),
    }
}
