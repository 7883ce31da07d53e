//! RolesCache keeps roles loaded from db per user
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use models::Role;
use types::UserId;

#[derive(Clone, Default)]
pub struct RolesCacheImpl {
    roles_cache: Arc<Mutex<HashMap<UserId, Vec<Role>>>>,
}

impl RolesCacheImpl {
    pub fn get(&self, user_id: UserId) -> Option<Vec<Role>> {
        self.roles_cache.lock().ok().and_then(|hash_map| hash_map.get(&user_id).cloned())
    }

    pub fn add_roles(&self, user_id: UserId, roles: &[Role]) {
        if let Ok(mut hash_map) = self.roles_cache.lock() {
            hash_map.insert(user_id, roles.to_vec());
        }
    }

    pub fn remove(&self, user_id: UserId) {
        if let Ok(mut hash_map) = self.roles_cache.lock() {
            hash_map.remove(&user_id);
        }
    }
}
