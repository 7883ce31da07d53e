//! Conversations repo. Uniqueness per target triple is kept by two partial
//! unique indexes, so inserts race safely with `ON CONFLICT DO NOTHING`.
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{Conversation, ConversationTarget, NewConversation};
use repos::types::RepoResult;
use schema::conversations::dsl as Conversations;
use types::{ConversationId, UserId};

pub trait ConversationsRepo {
    fn find(&self, conversation_id: ConversationId) -> RepoResult<Option<Conversation>>;

    /// Conversation for the exact `(target, buyer, seller)` triple
    fn find_for_target(&self, target: ConversationTarget, buyer_id: UserId, seller_id: UserId) -> RepoResult<Option<Conversation>>;

    /// Returns existing conversation for the triple or inserts a new one
    fn get_or_create(&self, payload: NewConversation) -> RepoResult<Conversation>;

    /// Conversations where the user is buyer or seller
    fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<Conversation>>;
}

pub struct ConversationsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ConversationsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ConversationsRepo
    for ConversationsRepoImpl<'a, T>
{
    fn find(&self, conversation_id: ConversationId) -> RepoResult<Option<Conversation>> {
        debug!("Find in conversations with id {}.", conversation_id);
        Conversations::conversations
            .filter(Conversations::id.eq(conversation_id))
            .get_result(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find conversation by id: {} error occurred", conversation_id)).into())
    }

    fn find_for_target(&self, target: ConversationTarget, buyer_id: UserId, seller_id: UserId) -> RepoResult<Option<Conversation>> {
        debug!("Find conversation for {:?}, buyer {}, seller {}.", target, buyer_id, seller_id);
        let query = Conversations::conversations
            .filter(Conversations::buyer_id.eq(buyer_id))
            .filter(Conversations::seller_id.eq(seller_id))
            .into_boxed();
        let query = match target {
            ConversationTarget::Listing(listing_id) => query
                .filter(Conversations::listing_id.eq(listing_id))
                .filter(Conversations::store_id.is_null()),
            ConversationTarget::Store(store_id) => query
                .filter(Conversations::store_id.eq(store_id))
                .filter(Conversations::listing_id.is_null()),
        };
        query
            .first(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Find conversation for {:?} error occurred", target)).into())
    }

    fn get_or_create(&self, payload: NewConversation) -> RepoResult<Conversation> {
        debug!("Get or create conversation {:?}.", payload);
        let target = match (payload.listing_id, payload.store_id) {
            (Some(listing_id), None) => ConversationTarget::Listing(listing_id),
            (None, Some(store_id)) => ConversationTarget::Store(store_id),
            _ => return Err(format_err!("Conversation {:?} must target exactly one of listing or store", payload)),
        };
        diesel::insert_into(Conversations::conversations)
            .values(&payload)
            .on_conflict_do_nothing()
            .execute(self.db_conn)
            .map_err(From::from)
            .and_then(|_| self.find_for_target(target, payload.buyer_id, payload.seller_id))
            .and_then(|conversation| conversation.ok_or_else(|| format_err!("Conversation vanished after insert")))
            .map_err(|e: FailureError| e.context(format!("Get or create conversation {:?} error occurred", payload)).into())
    }

    fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<Conversation>> {
        debug!("List conversations of user {}.", user_id);
        Conversations::conversations
            .filter(Conversations::buyer_id.eq(user_id).or(Conversations::seller_id.eq(user_id)))
            .order(Conversations::id.desc())
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List conversations of user {} error occurred", user_id)).into())
    }
}
