//! Listing photos, images themselves live in blob storage
use std::time::SystemTime;

use validator::Validate;

use schema::listing_photos;
use types::{ListingId, PhotoId};

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct ListingPhoto {
    pub id: PhotoId,
    pub listing_id: ListingId,
    pub image: String,
    pub is_main: bool,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "listing_photos"]
pub struct NewListingPhoto {
    pub listing_id: ListingId,
    pub image: String,
    pub is_main: bool,
}

/// Owner upload of an already stored image
#[derive(Serialize, Deserialize, Validate, Clone, Debug)]
pub struct AddPhoto {
    #[validate(length(min = "1", max = "255"))]
    pub image: String,
    pub is_main: bool,
}

/// Photo marked as main, otherwise the oldest one
pub fn main_photo(photos: &[ListingPhoto]) -> Option<ListingPhoto> {
    photos
        .iter()
        .find(|photo| photo.is_main)
        .or_else(|| photos.iter().min_by_key(|photo| photo.id))
        .cloned()
}
