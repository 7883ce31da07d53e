//! Models contains all structures that are used in different
//! modules of the app

pub mod attribute;
pub mod authorization;
pub mod category;
pub mod conversation;
pub mod favorite;
pub mod issue_report;
pub mod item;
pub mod listing;
pub mod notification;
pub mod pagination;
pub mod photo;
pub mod points;
pub mod promotion;
pub mod request;
pub mod store;
pub mod user;
pub mod user_role;
pub mod validation_rules;
pub mod verification;

pub use self::attribute::*;
pub use self::authorization::*;
pub use self::category::*;
pub use self::conversation::*;
pub use self::favorite::*;
pub use self::issue_report::*;
pub use self::item::*;
pub use self::listing::*;
pub use self::notification::*;
pub use self::pagination::*;
pub use self::photo::*;
pub use self::points::*;
pub use self::promotion::*;
pub use self::request::*;
pub use self::store::*;
pub use self::user::*;
pub use self::user_role::*;
pub use self::validation_rules::*;
pub use self::verification::*;
