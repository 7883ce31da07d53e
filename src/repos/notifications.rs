use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{NewNotification, Notification};
use repos::types::RepoResult;
use schema::notifications::dsl as Notifications;
use types::{NotificationId, UserId};

pub trait NotificationsRepo {
    fn create(&self, payload: NewNotification) -> RepoResult<Notification>;

    /// Most recent first
    fn list_for_user(&self, user_id: UserId, limit: i64) -> RepoResult<Vec<Notification>>;

    /// Marks one notification of the user, returns None if it belongs to someone else
    fn mark_read(&self, user_id: UserId, notification_id: NotificationId) -> RepoResult<Option<Notification>>;

    fn mark_all_read(&self, user_id: UserId) -> RepoResult<usize>;

    fn unread_count(&self, user_id: UserId) -> RepoResult<i64>;
}

pub struct NotificationsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> NotificationsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> NotificationsRepo
    for NotificationsRepoImpl<'a, T>
{
    fn create(&self, payload: NewNotification) -> RepoResult<Notification> {
        debug!("Create notification {:?}.", payload);
        diesel::insert_into(Notifications::notifications)
            .values(&payload)
            .get_result::<Notification>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create notification {:?} error occurred", payload)).into())
    }

    fn list_for_user(&self, user_id: UserId, limit: i64) -> RepoResult<Vec<Notification>> {
        debug!("List notifications of user {}, limit {}.", user_id, limit);
        Notifications::notifications
            .filter(Notifications::user_id.eq(user_id))
            .order((Notifications::created_at.desc(), Notifications::id.desc()))
            .limit(limit)
            .get_results(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("List notifications of user {} error occurred", user_id)).into())
    }

    fn mark_read(&self, user_id: UserId, notification_id: NotificationId) -> RepoResult<Option<Notification>> {
        debug!("Mark notification {} of user {} read.", notification_id, user_id);
        let filter = Notifications::notifications
            .filter(Notifications::id.eq(notification_id))
            .filter(Notifications::user_id.eq(user_id));
        diesel::update(filter)
            .set(Notifications::is_read.eq(true))
            .get_result::<Notification>(self.db_conn)
            .optional()
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Mark notification {} read error occurred", notification_id)).into())
    }

    fn mark_all_read(&self, user_id: UserId) -> RepoResult<usize> {
        debug!("Mark all notifications of user {} read.", user_id);
        let filter = Notifications::notifications
            .filter(Notifications::user_id.eq(user_id))
            .filter(Notifications::is_read.eq(false));
        diesel::update(filter)
            .set(Notifications::is_read.eq(true))
            .execute(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Mark all notifications of user {} read error occurred", user_id)).into())
    }

    fn unread_count(&self, user_id: UserId) -> RepoResult<i64> {
        debug!("Count unread notifications of user {}.", user_id);
        Notifications::notifications
            .filter(Notifications::user_id.eq(user_id))
            .filter(Notifications::is_read.eq(false))
            .select(count_star())
            .get_result(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Count unread notifications of user {} error occurred", user_id)).into())
    }
}
