//! Listings is the core of a classifieds marketplace: listings for sale and
//! wanted requests, their moderation, the points wallet, paid featured
//! promotions, chats and notifications.
//! The layered structure of the app is
//!
//! `Adapter -> Service -> Repo + Clients`
//!
//! Each layer can throw Error with context or cover occurred error with
//! Error in the context. Adapters (out of this crate) translate `errors::Error`
//! kinds found in the chain into their own responses.

#![allow(proc_macro_derive_resolution_fallback)]
#![recursion_limit = "128"]
extern crate config as config_crate;
#[macro_use]
extern crate diesel;
#[macro_use]
extern crate failure;
extern crate futures;
extern crate futures_cpupool;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate r2d2;
extern crate r2d2_redis;
extern crate rand;
extern crate regex;
extern crate reqwest;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;
extern crate validator;
#[macro_use]
extern crate validator_derive;
#[macro_use]
extern crate sentry;
extern crate tokio;
extern crate tokio_core;

#[macro_use]
pub mod macros;
pub mod clients;
pub mod config;
pub mod errors;
pub mod loaders;
pub mod models;
pub mod repos;
pub mod schema;
pub mod sentry_integration;
pub mod services;
pub mod sessions;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use failure::{Error as FailureError, ResultExt};
use futures::Future;
use futures_cpupool::CpuPool;
use r2d2_redis::RedisConnectionManager;

use clients::{
    HttpListingSearch, HttpModerationClassifier, HttpSmsSender, ListingSearch, ModerationClassifier, NoopModerationClassifier,
    NoopSmsSender, SmsSender,
};
use config::Config;
use loaders::promotions_sweeper;
use repos::repo_factory::ReposFactoryImpl;
use services::StaticContext;
use sessions::{MemorySessionStore, RedisSessionStore, SessionStore};

pub type PgStaticContext = StaticContext<PgConnection, ConnectionManager<PgConnection>, ReposFactoryImpl>;

/// Builds the context shared by all services from provided `Config`
pub fn create_static_context(config: Config) -> Result<PgStaticContext, FailureError> {
    // Prepare database pool
    let db_manager = ConnectionManager::<PgConnection>::new(config.server.database.clone());
    let db_pool = r2d2::Pool::builder()
        .build(db_manager)
        .context("Failed to create DB connection pool")?;

    // Prepare CPU pool
    let cpu_pool = CpuPool::new(config.server.thread_count);

    // Prepare session store
    let sessions = match config.server.redis {
        Some(ref redis_url) => {
            let redis_manager = RedisConnectionManager::new(redis_url.as_ref()).context("Failed to create Redis connection manager")?;
            let redis_pool = r2d2::Pool::builder()
                .build(redis_manager)
                .context("Failed to create Redis connection pool")?;
            Arc::new(RedisSessionStore::new(redis_pool)) as Arc<SessionStore>
        }
        None => {
            warn!("Redis is not configured, falling back to in-memory session store");
            Arc::new(MemorySessionStore::default()) as Arc<SessionStore>
        }
    };

    let classifier = match config.moderation {
        Some(ref moderation) => Arc::new(HttpModerationClassifier::new(
            moderation.url.clone(),
            moderation.api_key.clone(),
            Duration::from_millis(moderation.timeout_ms),
        )?) as Arc<ModerationClassifier>,
        None => Arc::new(NoopModerationClassifier::default()) as Arc<ModerationClassifier>,
    };

    let sms = match config.sms {
        Some(ref sms) => {
            Arc::new(HttpSmsSender::new(sms.url.clone(), sms.api_key.clone(), Duration::from_millis(sms.timeout_ms))?) as Arc<SmsSender>
        }
        None => Arc::new(NoopSmsSender::default()) as Arc<SmsSender>,
    };

    let search = match config.search {
        Some(ref search) => Some(Arc::new(HttpListingSearch::new(search.url.clone(), Duration::from_millis(search.timeout_ms))?)
            as Arc<ListingSearch>),
        None => None,
    };

    Ok(StaticContext::new(
        db_pool,
        cpu_pool,
        Arc::new(config),
        ReposFactoryImpl::default(),
        classifier,
        sms,
        search,
        sessions,
    ))
}

/// Starts the loop expiring featured promotions whose window is over
pub fn start_promotions_sweeper(config: Config) -> impl Future<Item = (), Error = FailureError> {
    let Config { server, sweeper, .. } = config;
    let sweeper = sweeper.unwrap_or_default();

    let db_manager = ConnectionManager::<PgConnection>::new(server.database);
    let db_pool = r2d2::Pool::builder().build(db_manager).map_err(FailureError::from);

    let interval = Duration::from_secs(sweeper.interval_s);
    let thread_pool = CpuPool::new(sweeper.thread_count);

    futures::future::result(db_pool).and_then(move |db_pool| {
        let ctx = promotions_sweeper::SweeperContext {
            db_pool,
            interval,
            thread_pool,
            repo_factory: ReposFactoryImpl::default(),
        };

        promotions_sweeper::run(ctx)
    })
}
