//! Services is a core layer for the app business logic like
//! validation, authorization, transactions and notification fan-out.

pub mod categories;
pub mod conversations;
pub mod favorites;
pub mod listings;
pub mod notifications;
pub mod phone_verification;
pub mod promotions;
pub mod stores;
pub mod types;
pub mod users;
pub mod wallet;

pub use self::categories::*;
pub use self::conversations::*;
pub use self::favorites::*;
pub use self::listings::*;
pub use self::notifications::*;
pub use self::phone_verification::*;
pub use self::promotions::*;
pub use self::stores::*;
pub use self::types::*;
pub use self::users::*;
pub use self::wallet::*;

use std::sync::Arc;

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use futures_cpupool::CpuPool;
use r2d2::{ManageConnection, Pool, PooledConnection};

use clients::{ListingSearch, ModerationClassifier, SmsSender};
use config::Config;
use errors::Error;
use repos::ReposFactory;
use sessions::SessionStore;
use types::UserId;

/// Context shared by every request
pub struct StaticContext<T, M, F>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    F: ReposFactory<T>,
{
    pub db_pool: Pool<M>,
    pub cpu_pool: CpuPool,
    pub config: Arc<Config>,
    pub repo_factory: F,
    pub classifier: Arc<ModerationClassifier>,
    pub sms: Arc<SmsSender>,
    pub search: Option<Arc<ListingSearch>>,
    pub sessions: Arc<SessionStore>,
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > StaticContext<T, M, F>
{
    pub fn new(
        db_pool: Pool<M>,
        cpu_pool: CpuPool,
        config: Arc<Config>,
        repo_factory: F,
        classifier: Arc<ModerationClassifier>,
        sms: Arc<SmsSender>,
        search: Option<Arc<ListingSearch>>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            db_pool,
            cpu_pool,
            config,
            repo_factory,
            classifier,
            sms,
            search,
            sessions,
        }
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Clone for StaticContext<T, M, F>
{
    fn clone(&self) -> Self {
        Self {
            db_pool: self.db_pool.clone(),
            cpu_pool: self.cpu_pool.clone(),
            config: self.config.clone(),
            repo_factory: self.repo_factory.clone(),
            classifier: self.classifier.clone(),
            sms: self.sms.clone(),
            search: self.search.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

/// Context of a single request
#[derive(Clone, Debug, Default)]
pub struct DynamicContext {
    pub user_id: Option<UserId>,
}

impl DynamicContext {
    pub fn new(user_id: Option<UserId>) -> Self {
        Self { user_id }
    }
}

pub struct Service<
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    M: ManageConnection<Connection = T>,
    F: ReposFactory<T>,
> {
    pub static_context: StaticContext<T, M, F>,
    pub dynamic_context: DynamicContext,
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Clone for Service<T, M, F>
{
    fn clone(&self) -> Self {
        Self {
            static_context: self.static_context.clone(),
            dynamic_context: self.dynamic_context.clone(),
        }
    }
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > Service<T, M, F>
{
    pub fn new(static_context: StaticContext<T, M, F>, dynamic_context: DynamicContext) -> Self {
        Self {
            static_context,
            dynamic_context,
        }
    }

    /// Runs `f` on the cpu pool with a connection taken from the db pool
    pub fn spawn_on_pool<R, Func>(&self, f: Func) -> ServiceFuture<R>
    where
        Func: FnOnce(PooledConnection<M>) -> Result<R, FailureError> + Send + 'static,
        R: Send + 'static,
    {
        let db_pool = self.static_context.db_pool.clone();
        let cpu_pool = self.static_context.cpu_pool.clone();
        Box::new(cpu_pool.spawn_fn(move || {
            db_pool
                .get()
                .map_err(|e| FailureError::from(e).context(Error::Connection).into())
                .and_then(f)
        }))
    }

    /// Signed in user of the request
    pub fn current_user(&self) -> Result<UserId, FailureError> {
        self.dynamic_context
            .user_id
            .ok_or_else(|| format_err!("Request is not authorized").context(Error::Forbidden).into())
    }
}
