use serde::{Deserialize, Serialize};

use crate::db;

pub use crate::db::department::Id;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Department {
    pub id: Id,
    pub name: String,
}

impl From<&db::Department> for Department {
    fn from(department: &db::Department) -> Self {
        Self {
            id: department.id,
            name: department.name.clone(),
        }
    }
}
