//! Conversations target exactly one of a listing or a store
use std::time::SystemTime;

use schema::{conversations, messages};
use types::{ConversationId, ListingId, MessageId, StoreId, UserId};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversationTarget {
    Listing(ListingId),
    Store(StoreId),
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub listing_id: Option<ListingId>,
    pub store_id: Option<StoreId>,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub created_at: SystemTime,
}

impl Conversation {
    pub fn target(&self) -> Option<ConversationTarget> {
        match (self.listing_id, self.store_id) {
            (Some(listing_id), None) => Some(ConversationTarget::Listing(listing_id)),
            (None, Some(store_id)) => Some(ConversationTarget::Store(store_id)),
            _ => None,
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug, PartialEq)]
#[table_name = "conversations"]
pub struct NewConversation {
    pub listing_id: Option<ListingId>,
    pub store_id: Option<StoreId>,
    pub buyer_id: UserId,
    pub seller_id: UserId,
}

impl NewConversation {
    pub fn new(target: ConversationTarget, buyer_id: UserId, seller_id: UserId) -> Self {
        let (listing_id, store_id) = match target {
            ConversationTarget::Listing(id) => (Some(id), None),
            ConversationTarget::Store(id) => (None, Some(id)),
        };
        Self {
            listing_id,
            store_id,
            buyer_id,
            seller_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub is_read: bool,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "messages"]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StartedConversation {
    pub conversation: Conversation,
    pub message: Option<Message>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct InboxEntry {
    pub conversation: Conversation,
    pub last_message_body: Option<String>,
    pub last_message_at: Option<SystemTime>,
    pub unread_count: i64,
}

impl InboxEntry {
    /// Last activity, falls back to creation time for empty conversations
    pub fn activity_at(&self) -> SystemTime {
        self.last_message_at.unwrap_or(self.conversation.created_at)
    }
}
