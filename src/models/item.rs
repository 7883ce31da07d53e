//! Item is the for-sale subtype of a listing
use schema::items;
use types::ListingId;

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum ItemCondition {
        New => "new",
        Used => "used",
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Item {
    pub listing_id: ListingId,
    pub price: f64,
    pub condition: ItemCondition,
    pub sold_on_site: Option<bool>,
    pub cancel_reason: Option<String>,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "items"]
pub struct NewItem {
    pub listing_id: ListingId,
    pub price: f64,
    pub condition: ItemCondition,
}

#[derive(Serialize, Deserialize, AsChangeset, Clone, Debug, Default)]
#[table_name = "items"]
pub struct UpdateItem {
    pub price: Option<f64>,
    pub condition: Option<ItemCondition>,
    pub sold_on_site: Option<bool>,
    pub cancel_reason: Option<String>,
}

impl UpdateItem {
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.condition.is_none() && self.sold_on_site.is_none() && self.cancel_reason.is_none()
    }
}
