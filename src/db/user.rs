use std::{collections::HashMap, error::Error as StdError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};
use uuid::Uuid;

use super::Client;

#[derive(Clone, Debug)]
pub struct User {
    pub id: Id,
    pub login: String,
    pub password_hash: PasswordHash,
    pub first_name: String,
    pub last_name: String,

    /// Whether the user is expected to take tickets into work.
    pub is_executor: bool,
}

impl User {
    /// "Last First", or the login when the profile carries no name.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.last_name, self.first_name);
        match name.trim() {
            "" => self.login.clone(),
            name => name.to_string(),
        }
    }

    fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            login: row.get("login"),
            password_hash: row.get("password_hash"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            is_executor: row.get("is_executor"),
        }
    }
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

#[derive(Clone, Debug, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(secret: &str) -> Self {
        // TODO: Use real hash function.
        Self(secret.to_string())
    }
}

impl FromSql<'_> for PasswordHash {
    accepts!(TEXT);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for PasswordHash {
    accepts!(TEXT);

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
    pub async fn get_user_by_login(
        &self,
        login: &str,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "\
            SELECT id, login, password_hash, first_name, last_name, \
                   is_executor \
            FROM users \
            WHERE login = $1 \
            LIMIT 1";
        Ok(self
            .0
            .query_opt(SQL, &[&login])
            .await?
            .map(|row| User::from_row(&row)))
    }

    pub async fn get_user_by_id(&self, id: Id) -> Result<Option<User>, Error> {
        const SQL: &str = "\
            SELECT id, login, password_hash, first_name, last_name, \
                   is_executor \
            FROM users \
            WHERE id = $1 \
            LIMIT 1";
        Ok(self
            .0
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| User::from_row(&row)))
    }

    pub async fn get_users_by_ids(
        &self,
        ids: &[Id],
    ) -> Result<HashMap<Id, User>, Error> {
        const SQL: &str = "\
            SELECT id, login, password_hash, first_name, last_name, \
                   is_executor \
            FROM users \
            WHERE id IN (SELECT unnest($1::UUID[]))";
        Ok(self
            .0
            .query(SQL, &[&ids])
            .await?
            .into_iter()
            .map(|row| {
                let user = User::from_row(&row);
                (user.id, user)
            })
            .collect())
    }
}
