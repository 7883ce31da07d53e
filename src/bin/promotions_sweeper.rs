extern crate failure;
extern crate futures;
#[macro_use]
extern crate log;
extern crate listings_lib;
extern crate tokio_core;
extern crate tokio_signal;
extern crate tracing_subscriber;

use failure::{err_msg, Error as FailureError};
use futures::{future, Future, Stream};
use tokio_core::reactor::Core;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = listings_lib::config::Config::new().expect("Can't load app config!");

    // Prepare sentry integration
    let _sentry = listings_lib::sentry_integration::init(config.sentry.as_ref());

    // Prepare logger, `log` records are forwarded as well
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ctrl_c = tokio_signal::ctrl_c()
        .flatten_stream()
        .into_future()
        .map_err(|(err, _rest)| FailureError::from(err))
        .and_then(|(ctrl_c, _rest)| match ctrl_c {
            None => future::err(err_msg("Unexpected error: Ctrl+C stream ended")),
            Some(_) => {
                info!("Ctrl+C received. Exiting...");
                future::ok(())
            }
        });

    let fut = listings_lib::start_promotions_sweeper(config)
        .select(ctrl_c)
        .map_err(|(err, _fut)| err);

    Core::new()
        .expect("Unexpected error occurred when creating an event loop core for promotions sweeper")
        .run(fut)
        .unwrap();
}
