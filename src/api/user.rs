use serde::{Deserialize, Serialize};

use crate::db;

pub use crate::db::user::{Id, PasswordHash};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub name: String,
    pub is_executor: bool,
}

impl From<&db::User> for User {
    fn from(user: &db::User) -> Self {
        Self {
            id: user.id,
            name: user.display_name(),
            is_executor: user.is_executor,
        }
    }
}

/// Current user along with the departments they belong to.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub supervised_departments: Vec<crate::api::Department>,
    pub employed_departments: Vec<crate::api::Department>,
}
