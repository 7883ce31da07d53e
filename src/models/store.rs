//! Stores and their followers
use std::time::SystemTime;

use schema::store_follows;
use types::{StoreFollowId, StoreId, UserId};

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Store {
    pub id: StoreId,
    pub user_id: UserId,
    pub name: String,
    pub city: Option<String>,
    pub is_active: bool,
    pub created_at: SystemTime,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct StoreFollow {
    pub id: StoreFollowId,
    pub store_id: StoreId,
    pub user_id: UserId,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "store_follows"]
pub struct NewStoreFollow {
    pub store_id: StoreId,
    pub user_id: UserId,
}

/// Store card with its followers count
#[derive(Debug, Serialize, Clone)]
pub struct StoreWithFollowers {
    pub store: Store,
    pub followers_count: i64,
}
