//! Enum for resources available in ACLs
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Resource {
    Listings,
    PointsTransactions,
    UserRoles,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Resource::Listings => write!(f, "listings"),
            Resource::PointsTransactions => write!(f, "points transactions"),
            Resource::UserRoles => write!(f, "user roles"),
        }
    }
}
