//! Users with their wallet balance and canonical phone
use std::time::SystemTime;

use models::validation_rules::validate_content;
use schema::users;
use types::UserId;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub phone: String,
    pub display_name: String,
    pub points: i32,
    pub referral_code: String,
    pub referred_by: Option<UserId>,
    pub is_active: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "users"]
pub struct NewUser {
    pub phone: String,
    pub display_name: String,
    pub points: i32,
    pub referral_code: String,
    pub referred_by: Option<UserId>,
}

/// Registration payload, `phone` may come in any accepted variant
#[derive(Serialize, Deserialize, Validate, Clone, Debug)]
pub struct RegisterUser {
    pub phone: String,
    #[validate(length(min = "1", max = "100"), custom = "validate_content")]
    pub display_name: String,
    pub referral_code: Option<String>,
}

/// Brings any accepted phone variant to the stored `07XXXXXXXX` form.
/// Unknown shapes are returned as bare digits.
pub fn canonicalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let digits = if digits.starts_with("00962") { digits[2..].to_string() } else { digits };

    if digits.starts_with("9627") && digits.len() == 12 {
        format!("0{}", &digits[3..])
    } else if digits.starts_with("07") && digits.len() == 10 {
        digits
    } else if digits.starts_with('7') && digits.len() == 9 {
        format!("0{}", digits)
    } else {
        digits
    }
}

/// Every string a stored phone may be compared against at login
pub fn phone_candidates(raw: &str) -> Vec<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let canonical = canonicalize_phone(raw);

    let mut candidates = vec![canonical.clone()];
    if !digits.is_empty() && digits != canonical {
        candidates.push(digits);
    }
    if canonical.starts_with("07") && canonical.len() == 10 {
        let international = format!("962{}", &canonical[1..]);
        if !candidates.contains(&international) {
            candidates.push(international);
        }
    }
    candidates
}
