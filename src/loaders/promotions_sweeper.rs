//! Sweeper expiring featured promotions whose window is over. Each tick runs
//! one transaction, so a failed tick leaves nothing half expired and the
//! next tick retries.

use std::time::{Duration, Instant, SystemTime};

use diesel::{pg::PgConnection, r2d2::ConnectionManager};
use failure::Error as FailureError;
use futures::{future, Future, Stream};
use futures_cpupool::CpuPool;
use r2d2::Pool;
use tokio::timer::Interval;

use repos::repo_factory::ReposFactoryImpl;
use sentry::integrations::failure::capture_error;
use services::promotions::expire_stale_promotions;

#[derive(Clone)]
pub struct SweeperContext {
    pub db_pool: Pool<ConnectionManager<PgConnection>>,
    pub interval: Duration,
    pub thread_pool: CpuPool,
    pub repo_factory: ReposFactoryImpl,
}

pub fn run(ctx: SweeperContext) -> impl Future<Item = (), Error = FailureError> {
    Interval::new(Instant::now(), ctx.interval)
        .map_err(FailureError::from)
        .fold(ctx, |ctx, _| {
            debug!("Started sweeping ended promotions");
            sweep(ctx.clone()).then(|res| {
                match res {
                    Ok(0) => debug!("No promotions to expire"),
                    Ok(count) => info!("Expired {} promotions", count),
                    Err(err) => {
                        let err = FailureError::from(err.context("An error occurred while expiring promotions"));
                        error!("{:?}", &err);
                        capture_error(&err);
                    }
                };

                future::ok::<_, FailureError>(ctx)
            })
        })
        .map(|_| ())
}

fn sweep(ctx: SweeperContext) -> impl Future<Item = usize, Error = FailureError> {
    let SweeperContext {
        db_pool,
        thread_pool,
        repo_factory,
        ..
    } = ctx;

    thread_pool.spawn(future::lazy(move || {
        let conn = db_pool.get().map_err(FailureError::from)?;
        expire_stale_promotions(&repo_factory, &*conn, SystemTime::now()).map(|expired| expired.len())
    }))
}
