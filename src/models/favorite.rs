use std::time::SystemTime;

use schema::favorites;
use types::{FavoriteId, ListingId, UserId};

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Favorite {
    pub id: FavoriteId,
    pub user_id: UserId,
    pub listing_id: ListingId,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "favorites"]
pub struct NewFavorite {
    pub user_id: UserId,
    pub listing_id: ListingId,
}
