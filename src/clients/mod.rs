//! Clients for the external collaborators of the core. Every call is bounded
//! by a timeout and must be made outside of an open transaction.

pub mod moderation;
pub mod search;
pub mod sms;

pub use self::moderation::*;
pub use self::search::*;
pub use self::sms::*;

use failure::Error as FailureError;
use futures::future::Future;

/// Client layer Future
pub type ClientFuture<T> = Box<Future<Item = T, Error = FailureError>>;
