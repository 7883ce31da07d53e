use std::time::Duration;

use failure::Error as FailureError;
use r2d2::Pool;
use r2d2_redis::redis;
use r2d2_redis::RedisConnectionManager;

use super::SessionStore;

pub struct RedisSessionStore {
    pool: Pool<RedisConnectionManager>,
}

impl RedisSessionStore {
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        Self { pool }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl SessionStore for RedisSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, FailureError> {
        let conn = self.pool.get()?;
        redis::cmd("GET")
            .arg(key)
            .query::<Option<String>>(&*conn)
            .map_err(|e| FailureError::from(e).context(format!("Redis GET {} failed", key)).into())
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FailureError> {
        let conn = self.pool.get()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query::<()>(&*conn)
            .map_err(|e| FailureError::from(e).context(format!("Redis SET {} failed", key)).into())
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, FailureError> {
        let conn = self.pool.get()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query::<Option<String>>(&*conn)
            .map(|reply| reply.is_some())
            .map_err(|e| FailureError::from(e).context(format!("Redis SET NX {} failed", key)).into())
    }

    fn remove(&self, key: &str) -> Result<(), FailureError> {
        let conn = self.pool.get()?;
        redis::cmd("DEL")
            .arg(key)
            .query::<()>(&*conn)
            .map_err(|e| FailureError::from(e).context(format!("Redis DEL {} failed", key)).into())
    }
}
