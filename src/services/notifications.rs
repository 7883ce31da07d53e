//! Notifications service, the read side of the notification fan-out.
//! Rows are written by the other services inside their transactions.

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use errors::Error;
use models::*;
use repos::ReposFactory;
use services::Service;
use types::NotificationId;

pub trait NotificationsService {
    /// Most recent notifications of the caller
    fn list_notifications(&self, limit: i64) -> ServiceFuture<Vec<Notification>>;
    /// Marks one notification of the caller as read
    fn mark_notification_read(&self, notification_id: NotificationId) -> ServiceFuture<Notification>;
    /// Marks every notification of the caller as read
    fn mark_all_notifications_read(&self) -> ServiceFuture<usize>;
    /// Badge counter
    fn unread_notifications_count(&self) -> ServiceFuture<i64>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > NotificationsService for Service<T, M, F>
{
    fn list_notifications(&self, limit: i64) -> ServiceFuture<Vec<Notification>> {
        let user_id = self.current_user();
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);
            user_id
                .and_then(|user_id| notifications_repo.list_for_user(user_id, clamp_limit(limit)))
                .map_err(|e| e.context("Service Notifications, list endpoint error occurred.").into())
        })
    }

    fn mark_notification_read(&self, notification_id: NotificationId) -> ServiceFuture<Notification> {
        let user_id = self.current_user();
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);
            user_id
                .and_then(|user_id| {
                    notifications_repo.mark_read(user_id, notification_id)?.ok_or_else(|| {
                        format_err!("Notification {} of user {} not found", notification_id, user_id)
                            .context(Error::NotFound)
                            .into()
                    })
                })
                .map_err(|e| e.context("Service Notifications, mark_read endpoint error occurred.").into())
        })
    }

    fn mark_all_notifications_read(&self) -> ServiceFuture<usize> {
        let user_id = self.current_user();
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);
            user_id
                .and_then(|user_id| notifications_repo.mark_all_read(user_id))
                .map_err(|e| e.context("Service Notifications, mark_all_read endpoint error occurred.").into())
        })
    }

    fn unread_notifications_count(&self) -> ServiceFuture<i64> {
        let user_id = self.current_user();
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);
            user_id
                .and_then(|user_id| notifications_repo.unread_count(user_id))
                .map_err(|e| e.context("Service Notifications, unread_count endpoint error occurred.").into())
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

    fn seed(db: &SharedMockDb, user_id: UserId, count: usize) {
        let mut db = db.lock().unwrap();
        for i in 0..count {
            let id = db.next_id();
            db.notifications.push(Notification {
                id: NotificationId(id),
                user_id,
                kind: NotificationKind::System,
                status: NotificationStatus::Info,
                title: format!("title {}", i),
                body: String::new(),
                listing_id: None,
                is_read: false,
                created_at: ::std::time::SystemTime::now(),
            });
        }
    }

    #[test]
    fn test_list_is_newest_first_and_clamped() {
        let db = MockDb::shared();
        let user = db.lock().unwrap().add_user(0);
        seed(&db, user.id, 3);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db);

        let all = core.run(service.list_notifications(500)).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].id > all[1].id && all[1].id > all[2].id);
        let one = core.run(service.list_notifications(0)).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn test_mark_read_and_counts() {
        let db = MockDb::shared();
        let (user, other) = {
            let mut db = db.lock().unwrap();
            (db.add_user(0), db.add_user(0))
        };
        seed(&db, user.id, 3);
        seed(&db, other.id, 1);
        let mut core = Core::new().unwrap();
        let service = create_service(Some(user.id), db.clone());

        assert_eq!(core.run(service.unread_notifications_count()).unwrap(), 3);
        let first = db.lock().unwrap().notifications_of(user.id)[0].id;
        let read = core.run(service.mark_notification_read(first)).unwrap();
        assert!(read.is_read);
        assert_eq!(core.run(service.unread_notifications_count()).unwrap(), 2);
        assert_eq!(core.run(service.mark_all_notifications_read()).unwrap(), 2);
        assert_eq!(core.run(service.mark_all_notifications_read()).unwrap(), 0);

        let foreign = db.lock().unwrap().notifications_of(other.id)[0].id;
        let err = core.run(service.mark_notification_read(foreign)).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::NotFound));
    }

    #[test]
    fn test_anonymous_caller_is_forbidden() {
        let db = MockDb::shared();
        let mut core = Core::new().unwrap();
        let service = create_service(None, db);
        let err = core.run(service.unread_notifications_count()).unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::Forbidden));
    }
}
