//! Request is the wanted-ad subtype of a listing
use schema::requests;
use types::ListingId;

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum ConditionPreference {
        Any => "any",
        New => "new",
        Used => "used",
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Request {
    pub listing_id: ListingId,
    pub budget: Option<f64>,
    pub condition_preference: ConditionPreference,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "requests"]
pub struct NewRequest {
    pub listing_id: ListingId,
    pub budget: Option<f64>,
    pub condition_preference: ConditionPreference,
}

#[derive(Serialize, Deserialize, AsChangeset, Clone, Debug, Default)]
#[table_name = "requests"]
pub struct UpdateRequest {
    pub budget: Option<f64>,
    pub condition_preference: Option<ConditionPreference>,
}

impl UpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.budget.is_none() && self.condition_preference.is_none()
    }
}
