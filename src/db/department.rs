use std::{collections::BTreeSet, error::Error as StdError};

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

use super::{user, Client};

/// Organizational unit tickets are routed to.
#[derive(Clone, Debug)]
pub struct Department {
    pub id: Id,
    pub name: String,

    /// Users allowed to manage tickets of this department.
    pub supervisors: BTreeSet<user::Id>,

    /// Candidates for a ticket executor.
    pub employees: BTreeSet<user::Id>,
}

impl Department {
    fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            supervisors: row
                .get::<_, Vec<user::Id>>("supervisor_ids")
                .into_iter()
                .collect(),
            employees: row
                .get::<_, Vec<user::Id>>("employee_ids")
                .into_iter()
                .collect(),
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

/// Aggregates supervisor and employee ids next to every department row.
const SELECT: &str = "\
    SELECT d.id, d.name, \
           ARRAY(SELECT s.user_id FROM department_supervisors s \
                 WHERE s.department_id = d.id) AS supervisor_ids, \
           ARRAY(SELECT e.user_id FROM department_employees e \
                 WHERE e.department_id = d.id) AS employee_ids \
    FROM departments d";

impl Client {
    pub async fn get_department_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Department>, Error> {
        let sql = format!("{SELECT} WHERE d.id = $1");
        Ok(self
            .0
            .query_opt(&sql, &[&id])
            .await?
            .map(|row| Department::from_row(&row)))
    }

    pub async fn get_departments(&self) -> Result<Vec<Department>, Error> {
        let sql = format!("{SELECT} ORDER BY d.name, d.id");
        Ok(self
            .0
            .query(&sql, &[])
            .await?
            .iter()
            .map(Department::from_row)
            .collect())
    }

    pub async fn get_departments_supervised_by(
        &self,
        user: user::Id,
    ) -> Result<Vec<Id>, Error> {
        const SQL: &str = "\
            SELECT department_id \
            FROM department_supervisors \
            WHERE user_id = $1";
        Ok(self
            .0
            .query(SQL, &[&user])
            .await?
            .into_iter()
            .map(|row| row.get("department_id"))
            .collect())
    }

    pub async fn get_departments_employing(
        &self,
        user: user::Id,
    ) -> Result<Vec<Id>, Error> {
        const SQL: &str = "\
            SELECT department_id \
            FROM department_employees \
            WHERE user_id = $1";
        Ok(self
            .0
            .query(SQL, &[&user])
            .await?
            .into_iter()
            .map(|row| row.get("department_id"))
            .collect())
    }

    pub async fn get_employees_of(
        &self,
        department: Id,
    ) -> Result<Vec<user::Id>, Error> {
        const SQL: &str = "\
            SELECT user_id \
            FROM department_employees \
            WHERE department_id = $1";
        Ok(self
            .0
            .query(SQL, &[&department])
            .await?
            .into_iter()
            .map(|row| row.get("user_id"))
            .collect())
    }
}
