//! Conversations service, chats about a listing or a store between
//! a buyer and the seller.

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use futures::future;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use errors::Error;
use models::*;
use repos::{ConversationsRepo, ReposFactory};
use services::Service;
use types::{ConversationId, UserId};

/// Trim-empty bodies and bodies with links or html are refused
fn checked_body(body: String) -> Result<String, FailureError> {
    if body.trim().is_empty() {
        return Err(format_err!("Message body is blank").context(Error::EmptyMessage).into());
    }
    if contains_forbidden_content(&body) {
        return Err(format_err!("Message body has links or html")
            .context(Error::Validate(validation_errors!({"body": ["content" => "Links and HTML are not allowed."]})))
            .into());
    }
    Ok(body)
}

fn participant_conversation(
    conversations_repo: &ConversationsRepo,
    conversation_id: ConversationId,
    user_id: UserId,
) -> Result<Conversation, FailureError> {
    let conversation = conversations_repo
        .find(conversation_id)?
        .ok_or_else(|| format_err!("Conversation {} not found", conversation_id).context(Error::NotFound))?;
    if !conversation.is_participant(user_id) {
        return Err(format_err!("User {} is not in conversation {}", user_id, conversation_id)
            .context(Error::NotParticipant)
            .into());
    }
    Ok(conversation)
}

pub trait ConversationsService {
    /// Opens the chat with the seller of `target`, appending the first message when given
    fn start_conversation(&self, target: ConversationTarget, first_body: Option<String>) -> ServiceFuture<StartedConversation>;
    fn send_message(&self, conversation_id: ConversationId, body: String) -> ServiceFuture<Message>;
    /// Marks messages of the other party as read, returns how many changed
    fn mark_read(&self, conversation_id: ConversationId) -> ServiceFuture<usize>;
    /// Conversations of the caller, most recent activity first
    fn inbox(&self) -> ServiceFuture<Vec<InboxEntry>>;
    /// Messages in `(created_at, id)` order
    fn messages(&self, conversation_id: ConversationId) -> ServiceFuture<Vec<Message>>;
    /// Unread messages over all conversations of the caller
    fn unread_total(&self) -> ServiceFuture<i64>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > ConversationsService for Service<T, M, F>
{
    fn start_conversation(&self, target: ConversationTarget, first_body: Option<String>) -> ServiceFuture<StartedConversation> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let listings_repo = repo_factory.create_listings_repo(&*conn, Some(user_id));
            let stores_repo = repo_factory.create_stores_repo(&*conn);
            let conversations_repo = repo_factory.create_conversations_repo(&*conn);
            let messages_repo = repo_factory.create_messages_repo(&*conn);

            conn.transaction::<StartedConversation, FailureError, _>(move || {
                let body = match first_body {
                    Some(body) => Some(checked_body(body)?),
                    None => None,
                };

                let seller_id = match target {
                    ConversationTarget::Listing(listing_id) => listings_repo
                        .find(listing_id)?
                        .and_then(|listing| if listing.is_deleted { None } else { Some(listing.user_id) })
                        .ok_or_else(|| format_err!("Listing {} not found", listing_id).context(Error::NotFound))?,
                    ConversationTarget::Store(store_id) => stores_repo
                        .find(store_id)?
                        .map(|store| store.user_id)
                        .ok_or_else(|| format_err!("Store {} not found", store_id).context(Error::NotFound))?,
                };
                if seller_id == user_id {
                    return Err(format_err!("User {} tried to chat with self about {:?}", user_id, target)
                        .context(Error::SelfChatForbidden)
                        .into());
                }

                let conversation = conversations_repo.get_or_create(NewConversation::new(target, user_id, seller_id))?;
                let message = match body {
                    Some(body) => Some(messages_repo.create(NewMessage {
                        conversation_id: conversation.id,
                        sender_id: user_id,
                        body,
                    })?),
                    None => None,
                };
                Ok(StartedConversation { conversation, message })
            })
            .map_err(|e| e.context("Service Conversations, start endpoint error occurred.").into())
        })
    }

    fn send_message(&self, conversation_id: ConversationId, body: String) -> ServiceFuture<Message> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let conversations_repo = repo_factory.create_conversations_repo(&*conn);
            let messages_repo = repo_factory.create_messages_repo(&*conn);

            conn.transaction::<Message, FailureError, _>(move || {
                let conversation = participant_conversation(&*conversations_repo, conversation_id, user_id)?;
                let body = checked_body(body)?;
                messages_repo.create(NewMessage {
                    conversation_id: conversation.id,
                    sender_id: user_id,
                    body,
                })
            })
            .map_err(|e| e.context("Service Conversations, send endpoint error occurred.").into())
        })
    }

    fn mark_read(&self, conversation_id: ConversationId) -> ServiceFuture<usize> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let conversations_repo = repo_factory.create_conversations_repo(&*conn);
            let messages_repo = repo_factory.create_messages_repo(&*conn);

            conn.transaction::<usize, FailureError, _>(move || {
                participant_conversation(&*conversations_repo, conversation_id, user_id)?;
                messages_repo.mark_read(conversation_id, user_id)
            })
            .map_err(|e| e.context("Service Conversations, mark_read endpoint error occurred.").into())
        })
    }

    fn inbox(&self) -> ServiceFuture<Vec<InboxEntry>> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let conversations_repo = repo_factory.create_conversations_repo(&*conn);
            let messages_repo = repo_factory.create_messages_repo(&*conn);

            conn.transaction::<Vec<InboxEntry>, FailureError, _>(move || {
                let mut entries = conversations_repo
                    .list_for_user(user_id)?
                    .into_iter()
                    .map(|conversation| {
                        let last = messages_repo.last_for_conversation(conversation.id)?;
                        let unread_count = messages_repo.unread_count(conversation.id, user_id)?;
                        Ok(InboxEntry {
                            last_message_body: last.as_ref().map(|message| message.body.clone()),
                            last_message_at: last.map(|message| message.created_at),
                            unread_count,
                            conversation,
                        })
                    })
                    .collect::<Result<Vec<_>, FailureError>>()?;
                entries.sort_by(|a, b| {
                    b.activity_at()
                        .cmp(&a.activity_at())
                        .then_with(|| b.conversation.id.cmp(&a.conversation.id))
                });
                Ok(entries)
            })
            .map_err(|e| e.context("Service Conversations, inbox endpoint error occurred.").into())
        })
    }

    fn messages(&self, conversation_id: ConversationId) -> ServiceFuture<Vec<Message>> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let conversations_repo = repo_factory.create_conversations_repo(&*conn);
            let messages_repo = repo_factory.create_messages_repo(&*conn);

            participant_conversation(&*conversations_repo, conversation_id, user_id)
                .and_then(|_| messages_repo.list_for_conversation(conversation_id))
                .map_err(|e| e.context("Service Conversations, messages endpoint error occurred.").into())
        })
    }

    fn unread_total(&self) -> ServiceFuture<i64> {
        let user_id = match self.current_user() {
            Ok(user_id) => user_id,
            Err(e) => return Box::new(future::err(e)),
        };
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let messages_repo = repo_factory.create_messages_repo(&*conn);
            messages_repo
                .unread_total(user_id)
                .map_err(|e| e.context("Service Conversations, unread_total endpoint error occurred.").into())
        })
    }
}

#[cfg(test)]
pub mod tests {
    use tokio_core::reactor::Core;

    use errors::Error;
    use models::*;
    use repos::repo_factory::tests::*;
    use services::*;
    use types::*;

    /// Seller with an item listing and a store, plus a buyer
    fn seed(db: &SharedMockDb) -> (User, User, Listing, Store) {
        let mut db = db.lock().unwrap();
        let seller = db.add_user(0);
        let buyer = db.add_user(0);
        let category = db.add_category(None);
        let listing = db.add_listing(seller.id, ListingType::Item, category.id);
        let store = db.add_store(seller.id);
        (seller, buyer, listing, store)
    }

    #[test]
    fn test_start_twice_reuses_conversation() {
        let db = MockDb::shared();
        let (seller, buyer, listing, _) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(buyer.id), db.clone());

        let target = ConversationTarget::Listing(listing.id);
        let first = core.run(service.start_conversation(target, Some("hi".to_string()))).unwrap();
        let second = core.run(service.start_conversation(target, Some("hi".to_string()))).unwrap();

        assert_eq!(first.conversation.id, second.conversation.id);
        assert_eq!(first.conversation.seller_id, seller.id);
        assert_eq!(first.conversation.buyer_id, buyer.id);
        let db = db.lock().unwrap();
        assert_eq!(db.conversations.len(), 1);
        assert_eq!(db.messages.len(), 2);
        assert!(db.messages.iter().all(|m| m.body == "hi" && !m.is_read));
    }

    #[test]
    fn test_listing_and_store_chats_are_separate() {
        let db = MockDb::shared();
        let (_, buyer, listing, store) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(buyer.id), db.clone());

        let by_listing = core
            .run(service.start_conversation(ConversationTarget::Listing(listing.id), None))
            .unwrap();
        let by_store = core.run(service.start_conversation(ConversationTarget::Store(store.id), None)).unwrap();

        assert_ne!(by_listing.conversation.id, by_store.conversation.id);
        assert_eq!(by_store.conversation.target(), Some(ConversationTarget::Store(store.id)));
        assert_eq!(by_store.conversation.listing_id, None);
        assert!(by_store.message.is_none());
    }

    #[test]
    fn test_self_chat_is_forbidden() {
        let db = MockDb::shared();
        let (seller, _, listing, store) = seed(&db);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(seller.id), db.clone());

        let err = core
            .run(service.start_conversation(ConversationTarget::Listing(listing.id), Some("hi".to_string())))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::SelfChatForbidden));
        let err = core.run(service.start_conversation(ConversationTarget::Store(store.id), None)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::SelfChatForbidden));
        assert!(db.lock().unwrap().conversations.is_empty());
    }

    #[test]
    fn test_send_checks_participant_and_body() {
        let db = MockDb::shared();
        let (seller, buyer, listing, _) = seed(&db);
        let stranger = db.lock().unwrap().add_user(0);
        let mut core = Core::new().unwrap();
        let buyer_service = create_service(Some(buyer.id), db.clone());
        let started = core
            .run(buyer_service.start_conversation(ConversationTarget::Listing(listing.id), None))
            .unwrap();
        let conversation_id = started.conversation.id;

        let err = core.run(buyer_service.send_message(conversation_id, "   ".to_string())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::EmptyMessage));

        let err = core
            .run(buyer_service.send_message(conversation_id, "see http://elsewhere.example".to_string()))
            .unwrap_err();
        match Error::kind_of(&err) {
            Some(Error::Validate(_)) => (),
            other => panic!("unexpected error kind {:?}", other),
        }

        let stranger_service = create_service(Some(stranger.id), db.clone());
        let err = core.run(stranger_service.send_message(conversation_id, "hello".to_string())).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotParticipant));

        let seller_service = create_service(Some(seller.id), db.clone());
        let message = core.run(seller_service.send_message(conversation_id, "still here".to_string())).unwrap();
        assert_eq!(message.sender_id, seller.id);
        assert_eq!(db.lock().unwrap().messages.len(), 1);
    }

    #[test]
    fn test_read_receipts_and_inbox() {
        let db = MockDb::shared();
        let (seller, buyer, listing, store) = seed(&db);
        let mut core = Core::new().unwrap();
        let buyer_service = create_service(Some(buyer.id), db.clone());
        let seller_service = create_service(Some(seller.id), db.clone());

        let by_listing = core
            .run(buyer_service.start_conversation(ConversationTarget::Listing(listing.id), Some("is it available?".to_string())))
            .unwrap()
            .conversation;
        let by_store = core
            .run(buyer_service.start_conversation(ConversationTarget::Store(store.id), None))
            .unwrap()
            .conversation;
        core.run(buyer_service.send_message(by_listing.id, "hello?".to_string())).unwrap();
        core.run(seller_service.send_message(by_listing.id, "yes".to_string())).unwrap();

        assert_eq!(core.run(seller_service.unread_total()).unwrap(), 2);
        assert_eq!(core.run(buyer_service.unread_total()).unwrap(), 1);

        let inbox = core.run(seller_service.inbox()).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].conversation.id, by_listing.id);
        assert_eq!(inbox[0].last_message_body, Some("yes".to_string()));
        assert_eq!(inbox[0].unread_count, 2);
        assert_eq!(inbox[1].conversation.id, by_store.id);
        assert_eq!(inbox[1].last_message_at, None);

        assert_eq!(core.run(seller_service.mark_read(by_listing.id)).unwrap(), 2);
        assert_eq!(core.run(seller_service.unread_total()).unwrap(), 0);
        assert_eq!(core.run(buyer_service.unread_total()).unwrap(), 1);

        let messages = core.run(buyer_service.messages(by_listing.id)).unwrap();
        let bodies = messages.iter().map(|m| m.body.as_str()).collect::<Vec<_>>();
        assert_eq!(bodies, vec!["is it available?", "hello?", "yes"]);
    }

    #[test]
    fn test_mark_read_twice_changes_nothing() {
        let db = MockDb::shared();
        let (seller, buyer, listing, _) = seed(&db);
        let mut core = Core::new().unwrap();
        let buyer_service = create_service(Some(buyer.id), db.clone());
        let seller_service = create_service(Some(seller.id), db.clone());

        let conversation = core
            .run(buyer_service.start_conversation(ConversationTarget::Listing(listing.id), Some("still for sale?".to_string())))
            .unwrap()
            .conversation;
        core.run(seller_service.send_message(conversation.id, "yes".to_string())).unwrap();

        assert_eq!(core.run(seller_service.mark_read(conversation.id)).unwrap(), 1);
        let after_first = db.lock().unwrap().messages.clone();
        assert_eq!(core.run(seller_service.mark_read(conversation.id)).unwrap(), 0);
        let after_second = db.lock().unwrap().messages.clone();
        assert_eq!(after_first, after_second);

        let states = after_second.iter().map(|m| (m.sender_id, m.is_read)).collect::<Vec<_>>();
        assert_eq!(states, vec![(buyer.id, true), (seller.id, false)]);
    }

    #[test]
    fn test_stranger_can_not_read_messages() {
        let db = MockDb::shared();
        let (_, buyer, listing, _) = seed(&db);
        let stranger = db.lock().unwrap().add_user(0);
        let mut core = Core::new().unwrap();
        let buyer_service = create_service(Some(buyer.id), db.clone());
        let conversation = core
            .run(buyer_service.start_conversation(ConversationTarget::Listing(listing.id), Some("hi".to_string())))
            .unwrap()
            .conversation;

        let stranger_service = create_service(Some(stranger.id), db.clone());
        let err = core.run(stranger_service.messages(conversation.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotParticipant));
        let err = core.run(stranger_service.mark_read(conversation.id)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotParticipant));

        let err = core.run(stranger_service.messages(ConversationId(9999))).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotFound));
    }
}
