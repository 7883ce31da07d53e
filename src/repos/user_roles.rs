//! Repo for user_roles table. UserRole is an entity that connects
//! users and roles. I.e. this table is for user has-many roles
//! relationship
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::authorization::*;
use models::{NewUserRole, Role, UserRole};
use repos::acl;
use repos::legacy_acl::CheckScope;
use repos::types::{RepoAcl, RepoResult};
use repos::RolesCacheImpl;
use schema::user_roles::dsl as UserRoles;
use types::UserId;

/// UserRoles repository for handling UserRoles
pub trait UserRolesRepo {
    /// Returns list of roles for a specific user
    fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<Role>>;

    /// Create a new user role
    fn create(&self, payload: NewUserRole) -> RepoResult<UserRole>;
}

/// Implementation of UserRoles trait
pub struct UserRolesRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: Box<RepoAcl<UserRole>>,
    pub cached_roles: RolesCacheImpl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> UserRolesRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: Box<RepoAcl<UserRole>>, cached_roles: RolesCacheImpl) -> Self {
        Self {
            db_conn,
            acl,
            cached_roles,
        }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> UserRolesRepo for UserRolesRepoImpl<'a, T> {
    fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<Role>> {
        debug!("List user roles for id {}.", user_id);
        if let Some(roles) = self.cached_roles.get(user_id) {
            return Ok(roles);
        }
        UserRoles::user_roles
            .filter(UserRoles::user_id.eq(user_id))
            .get_results::<UserRole>(self.db_conn)
            .map_err(From::from)
            .map(|user_roles| user_roles.into_iter().map(|user_role| user_role.role).collect::<Vec<Role>>())
            .map(|roles| {
                self.cached_roles.add_roles(user_id, &roles);
                roles
            })
            .map_err(|e: FailureError| e.context(format!("List user roles for user {} error occurred", user_id)).into())
    }

    fn create(&self, payload: NewUserRole) -> RepoResult<UserRole> {
        debug!("Create new user role {:?}.", payload);
        self.cached_roles.remove(payload.user_id);
        diesel::insert_into(UserRoles::user_roles)
            .values(&payload)
            .get_result::<UserRole>(self.db_conn)
            .map_err(From::from)
            .and_then(|user_role| {
                acl::check(&*self.acl, Resource::UserRoles, Action::Create, self, Some(&user_role))?;
                Ok(user_role)
            })
            .map_err(|e: FailureError| e.context(format!("Create user role {:?} error occurred", payload)).into())
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<Scope, UserRole>
    for UserRolesRepoImpl<'a, T>
{
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&UserRole>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => {
                if let Some(user_role) = obj {
                    user_role.user_id == user_id
                } else {
                    false
                }
            }
        }
    }
}
