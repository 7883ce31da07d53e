use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{Message, NewMessage};
use repos::types::RepoResult;
use schema::conversations::dsl as Conversations;
use schema::messages::dsl as Messages;
use types::{ConversationId, UserId};

pub trait MessagesRepo {
    /// Appends an unread message
    fn create(&self, payload: NewMessage) -> RepoResult<Message>;

    /// Messages ordered by `(created_at, id)`
    fn list_for_conversation(&self, conversation_id: ConversationId) -> RepoResult<Vec<Message>>;

    /// Marks as read every message not sent by the reader
    fn mark_read(&self, conversation_id: ConversationId, reader_id: UserId) -> RepoResult<usize>;

    fn last_for_conversation(&self, conversation_id: ConversationId) -> RepoResult<Option<Message>>;

    /// Unread messages from the other party of a single conversation
    fn unread_count(&self, conversation_id: ConversationId, reader_id: UserId) -> RepoResult<i64>;

    /// Unread messages from the other party across every conversation of the user
    fn unread_total(&self, user_id: UserId) -> RepoResult<i64>;
}

pub struct MessagesRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> MessagesRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> MessagesRepo for MessagesRepoImpl<'a, T> {
    fn create(&self, payload: NewMessage) -> RepoResult<Message> {
        debug!("Create message in conversation {}.", payload.conversation_id);
        diesel::insert_into(Messages::messages)
            .values(&payload)
            .get_result::<Message>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create message {:?} error occurred", payload)).into())
    }

    fn list_for_conversation(&self, conversation_id: ConversationId) -> RepoResult<Vec<Message>> {
        debug!("List messages of conversation {}.", conversation_id);
        Messages::messages
            .filter(Messages::conversation_id.eq(conversation_id))
            .order((Messages::created_at, Messages::id))
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List messages of conversation {} error occurred", conversation_id)).into())
    }

    fn mark_read(&self, conversation_id: ConversationId, reader_id: UserId) -> RepoResult<usize> {
        debug!("Mark messages of conversation {} read by {}.", conversation_id, reader_id);
        let filter = Messages::messages
            .filter(Messages::conversation_id.eq(conversation_id))
            .filter(Messages::sender_id.ne(reader_id))
            .filter(Messages::is_read.eq(false));
        diesel::update(filter)
            .set(Messages::is_read.eq(true))
            .execute(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| {
                e.context(format!("Mark messages of conversation {} read error occurred", conversation_id))
                    .into()
            })
    }

    fn last_for_conversation(&self, conversation_id: ConversationId) -> RepoResult<Option<Message>> {
        debug!("Find last message of conversation {}.", conversation_id);
        Messages::messages
            .filter(Messages::conversation_id.eq(conversation_id))
            .order((Messages::created_at.desc(), Messages::id.desc()))
            .first(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| {
                e.context(format!("Find last message of conversation {} error occurred", conversation_id))
                    .into()
            })
    }

    fn unread_count(&self, conversation_id: ConversationId, reader_id: UserId) -> RepoResult<i64> {
        debug!("Count unread messages of conversation {} for {}.", conversation_id, reader_id);
        Messages::messages
            .filter(Messages::conversation_id.eq(conversation_id))
            .filter(Messages::sender_id.ne(reader_id))
            .filter(Messages::is_read.eq(false))
            .select(count_star())
            .get_result(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| {
                e.context(format!("Count unread messages of conversation {} error occurred", conversation_id))
                    .into()
            })
    }

    fn unread_total(&self, user_id: UserId) -> RepoResult<i64> {
        debug!("Count unread messages of user {}.", user_id);
        let own_conversations = Conversations::conversations
            .filter(Conversations::buyer_id.eq(user_id).or(Conversations::seller_id.eq(user_id)))
            .select(Conversations::id);
        Messages::messages
            .filter(Messages::conversation_id.eq_any(own_conversations))
            .filter(Messages::sender_id.ne(user_id))
            .filter(Messages::is_read.eq(false))
            .select(count_star())
            .get_result(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Count unread messages of user {} error occurred", user_id)).into())
    }
}
