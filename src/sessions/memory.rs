use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use failure::Error as FailureError;

use super::SessionStore;

/// Process local store, used when Redis is not configured and in tests
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemorySessionStore {
    fn entries(&self) -> Result<MutexGuard<HashMap<String, (String, Instant)>>, FailureError> {
        self.entries
            .lock()
            .map_err(|_| format_err!("Session store lock is poisoned"))
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, FailureError> {
        let mut entries = self.entries()?;
        let expired = match entries.get(key) {
            Some(&(ref value, expires_at)) if expires_at > Instant::now() => return Ok(Some(value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FailureError> {
        self.entries()?
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, FailureError> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        let present = entries.get(key).map(|&(_, expires_at)| expires_at > now).unwrap_or(false);
        if present {
            Ok(false)
        } else {
            entries.insert(key.to_string(), (value.to_string(), now + ttl));
            Ok(true)
        }
    }

    fn remove(&self, key: &str) -> Result<(), FailureError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_set_if_absent_only_once() {
        let store = MemorySessionStore::default();
        let ttl = Duration::from_secs(60);
        assert!(store.set_if_absent("viewed:s:1", "1", ttl).unwrap());
        assert!(!store.set_if_absent("viewed:s:1", "1", ttl).unwrap());
        store.remove("viewed:s:1").unwrap();
        assert!(store.set_if_absent("viewed:s:1", "1", ttl).unwrap());
    }

    #[test]
    fn test_entries_expire() {
        let store = MemorySessionStore::default();
        store.set("code", "1234", Duration::from_millis(10)).unwrap();
        assert_eq!(store.get("code").unwrap(), Some("1234".to_string()));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.get("code").unwrap(), None);
        assert!(store.set_if_absent("code", "5678", Duration::from_secs(1)).unwrap());
    }
}
