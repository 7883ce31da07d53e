use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;

use models::*;
use repos::legacy_acl::{Acl, SystemACL};
use repos::*;
use types::UserId;

pub trait ReposFactory<C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static>: Clone + Send + 'static {
    fn create_users_repo<'a>(&self, db_conn: &'a C) -> Box<UsersRepo + 'a>;
    fn create_user_roles_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<UserRolesRepo + 'a>;
    fn create_user_roles_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<UserRolesRepo + 'a>;
    fn create_points_transactions_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<PointsTransactionsRepo + 'a>;
    fn create_points_transactions_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<PointsTransactionsRepo + 'a>;
    fn create_listings_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<ListingsRepo + 'a>;
    fn create_items_repo<'a>(&self, db_conn: &'a C) -> Box<ItemsRepo + 'a>;
    fn create_requests_repo<'a>(&self, db_conn: &'a C) -> Box<RequestsRepo + 'a>;
    fn create_attribute_values_repo<'a>(&self, db_conn: &'a C) -> Box<AttributeValuesRepo + 'a>;
    fn create_categories_repo<'a>(&self, db_conn: &'a C) -> Box<CategoriesRepo + 'a>;
    fn create_photos_repo<'a>(&self, db_conn: &'a C) -> Box<PhotosRepo + 'a>;
    fn create_favorites_repo<'a>(&self, db_conn: &'a C) -> Box<FavoritesRepo + 'a>;
    fn create_stores_repo<'a>(&self, db_conn: &'a C) -> Box<StoresRepo + 'a>;
    fn create_store_follows_repo<'a>(&self, db_conn: &'a C) -> Box<StoreFollowsRepo + 'a>;
    fn create_conversations_repo<'a>(&self, db_conn: &'a C) -> Box<ConversationsRepo + 'a>;
    fn create_messages_repo<'a>(&self, db_conn: &'a C) -> Box<MessagesRepo + 'a>;
    fn create_promotions_repo<'a>(&self, db_conn: &'a C) -> Box<PromotionsRepo + 'a>;
    fn create_promotion_events_repo<'a>(&self, db_conn: &'a C) -> Box<PromotionEventsRepo + 'a>;
    fn create_notifications_repo<'a>(&self, db_conn: &'a C) -> Box<NotificationsRepo + 'a>;
    fn create_issue_reports_repo<'a>(&self, db_conn: &'a C) -> Box<IssueReportsRepo + 'a>;
}

#[derive(Clone, Default)]
pub struct ReposFactoryImpl {
    roles_cache: RolesCacheImpl,
}

impl ReposFactoryImpl {
    pub fn new(roles_cache: RolesCacheImpl) -> Self {
        Self { roles_cache }
    }

    pub fn get_roles<'a, C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static>(
        &self,
        id: UserId,
        db_conn: &'a C,
    ) -> Vec<Role> {
        self.create_user_roles_repo_with_sys_acl(db_conn)
            .list_for_user(id)
            .ok()
            .unwrap_or_default()
    }

    fn get_acl<'a, T, C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static>(
        &self,
        db_conn: &'a C,
        user_id: Option<UserId>,
    ) -> Box<Acl<Resource, Action, Scope, FailureError, T>> {
        user_id.map_or(
            Box::new(UnauthorizedAcl::default()) as Box<Acl<Resource, Action, Scope, FailureError, T>>,
            |id| {
                let roles = self.get_roles(id, db_conn);
                Box::new(ApplicationAcl::new(roles, id)) as Box<Acl<Resource, Action, Scope, FailureError, T>>
            },
        )
    }
}

impl<C: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> ReposFactory<C> for ReposFactoryImpl {
    fn create_users_repo<'a>(&self, db_conn: &'a C) -> Box<UsersRepo + 'a> {
        Box::new(UsersRepoImpl::new(db_conn)) as Box<UsersRepo>
    }
    fn create_user_roles_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<UserRolesRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(UserRolesRepoImpl::new(db_conn, acl, self.roles_cache.clone())) as Box<UserRolesRepo>
    }
    fn create_user_roles_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<UserRolesRepo + 'a> {
        Box::new(UserRolesRepoImpl::new(
            db_conn,
            Box::new(SystemACL::default()) as Box<RepoAcl<UserRole>>,
            self.roles_cache.clone(),
        )) as Box<UserRolesRepo>
    }
    fn create_points_transactions_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<PointsTransactionsRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(PointsTransactionsRepoImpl::new(db_conn, acl)) as Box<PointsTransactionsRepo>
    }
    fn create_points_transactions_repo_with_sys_acl<'a>(&self, db_conn: &'a C) -> Box<PointsTransactionsRepo + 'a> {
        Box::new(PointsTransactionsRepoImpl::new(
            db_conn,
            Box::new(SystemACL::default()) as Box<RepoAcl<PointsTransaction>>,
        )) as Box<PointsTransactionsRepo>
    }
    fn create_listings_repo<'a>(&self, db_conn: &'a C, user_id: Option<UserId>) -> Box<ListingsRepo + 'a> {
        let acl = self.get_acl(db_conn, user_id);
        Box::new(ListingsRepoImpl::new(db_conn, acl)) as Box<ListingsRepo>
    }
    fn create_items_repo<'a>(&self, db_conn: &'a C) -> Box<ItemsRepo + 'a> {
        Box::new(ItemsRepoImpl::new(db_conn)) as Box<ItemsRepo>
    }
    fn create_requests_repo<'a>(&self, db_conn: &'a C) -> Box<RequestsRepo + 'a> {
        Box::new(RequestsRepoImpl::new(db_conn)) as Box<RequestsRepo>
    }
    fn create_attribute_values_repo<'a>(&self, db_conn: &'a C) -> Box<AttributeValuesRepo + 'a> {
        Box::new(AttributeValuesRepoImpl::new(db_conn)) as Box<AttributeValuesRepo>
    }
    fn create_categories_repo<'a>(&self, db_conn: &'a C) -> Box<CategoriesRepo + 'a> {
        Box::new(CategoriesRepoImpl::new(db_conn)) as Box<CategoriesRepo>
    }
    fn create_photos_repo<'a>(&self, db_conn: &'a C) -> Box<PhotosRepo + 'a> {
        Box::new(PhotosRepoImpl::new(db_conn)) as Box<PhotosRepo>
    }
    fn create_favorites_repo<'a>(&self, db_conn: &'a C) -> Box<FavoritesRepo + 'a> {
        Box::new(FavoritesRepoImpl::new(db_conn)) as Box<FavoritesRepo>
    }
    fn create_stores_repo<'a>(&self, db_conn: &'a C) -> Box<StoresRepo + 'a> {
        Box::new(StoresRepoImpl::new(db_conn)) as Box<StoresRepo>
    }
    fn create_store_follows_repo<'a>(&self, db_conn: &'a C) -> Box<StoreFollowsRepo + 'a> {
        Box::new(StoreFollowsRepoImpl::new(db_conn)) as Box<StoreFollowsRepo>
    }
    fn create_conversations_repo<'a>(&self, db_conn: &'a C) -> Box<ConversationsRepo + 'a> {
        Box::new(ConversationsRepoImpl::new(db_conn)) as Box<ConversationsRepo>
    }
    fn create_messages_repo<'a>(&self, db_conn: &'a C) -> Box<MessagesRepo + 'a> {
        Box::new(MessagesRepoImpl::new(db_conn)) as Box<MessagesRepo>
    }
    fn create_promotions_repo<'a>(&self, db_conn: &'a C) -> Box<PromotionsRepo + 'a> {
        Box::new(PromotionsRepoImpl::new(db_conn)) as Box<PromotionsRepo>
    }
    fn create_promotion_events_repo<'a>(&self, db_conn: &'a C) -> Box<PromotionEventsRepo + 'a> {
        Box::new(PromotionEventsRepoImpl::new(db_conn)) as Box<PromotionEventsRepo>
    }
    fn create_notifications_repo<'a>(&self, db_conn: &'a C) -> Box<NotificationsRepo + 'a> {
        Box::new(NotificationsRepoImpl::new(db_conn)) as Box<NotificationsRepo>
    }
    fn create_issue_reports_repo<'a>(&self, db_conn: &'a C) -> Box<IssueReportsRepo + 'a> {
        Box::new(IssueReportsRepoImpl::new(db_conn)) as Box<IssueReportsRepo>
    }
}
