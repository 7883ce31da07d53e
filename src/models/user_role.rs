//! Models for managing Roles
use schema::user_roles;
use types::{RoleId, UserId};

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum Role {
        User => "user",
        Moderator => "moderator",
        Superuser => "superuser",
    }
}

#[derive(Serialize, Queryable, Clone, Debug)]
pub struct UserRole {
    pub id: RoleId,
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Serialize, Deserialize, Insertable, Clone, Debug)]
#[table_name = "user_roles"]
pub struct NewUserRole {
    pub user_id: UserId,
    pub role: Role,
}
