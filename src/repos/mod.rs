//! Repos is a module responsible for interacting with postgres db
#[macro_use]
pub mod acl;
pub mod attribute_values;
pub mod categories;
pub mod conversations;
pub mod favorites;
pub mod issue_reports;
pub mod items;
pub mod listings;
pub mod messages;
pub mod notifications;
pub mod photos;
pub mod points_transactions;
pub mod promotions;
pub mod repo_factory;
pub mod requests;
pub mod stores;
pub mod types;
pub mod user_roles;
pub mod users;

pub use self::acl::*;
pub use self::attribute_values::*;
pub use self::categories::*;
pub use self::conversations::*;
pub use self::favorites::*;
pub use self::issue_reports::*;
pub use self::items::*;
pub use self::listings::*;
pub use self::messages::*;
pub use self::notifications::*;
pub use self::photos::*;
pub use self::points_transactions::*;
pub use self::promotions::*;
pub use self::repo_factory::*;
pub use self::requests::*;
pub use self::stores::*;
pub use self::types::*;
pub use self::user_roles::*;
pub use self::users::*;
