use std::error::Error as StdError;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};
use uuid::Uuid;

use super::{ticket, Client};

/// Named file reference. Content storage lives elsewhere.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub id: Id,
    pub name: String,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl FromSql<'_> for Id {
    accepts!(UUID);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Uuid::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(UUID);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

impl Client {
    pub async fn get_attachments_of(
        &self,
        ticket: ticket::Id,
    ) -> Result<Vec<Attachment>, Error> {
        const SQL: &str = "\
            SELECT a.id, a.name \
            FROM attachments a \
            JOIN ticket_attachments t ON t.attachment_id = a.id \
            WHERE t.ticket_id = $1 \
            ORDER BY a.name, a.id";
        Ok(self
            .0
            .query(SQL, &[&ticket])
            .await?
            .into_iter()
            .map(|row| Attachment {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    pub async fn get_attachments_by_ids(
        &self,
        ids: &[Id],
    ) -> Result<Vec<Attachment>, Error> {
        const SQL: &str = "\
            SELECT id, name \
            FROM attachments \
            WHERE id IN (SELECT unnest($1::UUID[]))";
        Ok(self
            .0
            .query(SQL, &[&ids])
            .await?
            .into_iter()
            .map(|row| Attachment {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    pub async fn insert_attachment(
        &self,
        attachment: &Attachment,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO attachments (id, name) \
            VALUES ($1, $2)";
        self.0
            .execute(SQL, &[&attachment.id, &attachment.name])
            .await
            .map(drop)
    }
}
