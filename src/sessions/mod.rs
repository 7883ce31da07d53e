//! Session store holding short lived markers and codes. The core only needs
//! keyed get/set with expiry and an atomic "set if absent".

pub mod memory;
pub mod redis;

pub use self::memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

use std::time::Duration;

use failure::Error as FailureError;

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, FailureError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FailureError>;

    /// Returns `true` when the key was absent and has been set
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, FailureError>;

    fn remove(&self, key: &str) -> Result<(), FailureError>;
}
