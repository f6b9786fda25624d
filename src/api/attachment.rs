use serde::{Deserialize, Serialize};

use crate::db;

pub use crate::db::attachment::Id;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Attachment {
    pub id: Id,
    pub name: String,
}

impl From<db::Attachment> for Attachment {
    fn from(attachment: db::Attachment) -> Self {
        Self {
            id: attachment.id,
            name: attachment.name,
        }
    }
}
