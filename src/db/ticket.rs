use std::{collections::BTreeSet, error::Error as StdError};

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};
use uuid::Uuid;

use super::{attachment, department, user, Client};

#[derive(Clone, Debug, PartialEq)]
pub struct Ticket {
    pub id: Id,
    pub created_at: OffsetDateTime,
    pub department: department::Id,
    pub title: String,
    pub description: String,
    pub creator: user::Id,

    /// Set once the ticket has been taken into work.
    pub executor: Option<user::Id>,
    pub status: Status,
    pub attachments: BTreeSet<attachment::Id>,
    pub deadline: Option<Date>,
    pub priority: Priority,
}

impl Ticket {
    fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            created_at: row.get("created_at"),
            department: row.get("department_id"),
            title: row.get("title"),
            description: row.get("description"),
            creator: row.get("creator_id"),
            executor: row.get("executor_id"),
            status: row.get("status"),
            attachments: row
                .get::<_, Vec<attachment::Id>>("attachment_ids")
                .into_iter()
                .collect(),
            deadline: row.get("deadline"),
            priority: row.get("priority"),
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

impl Id {
    pub fn new() -> Self {
        Id(Uuid::new_v4())
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

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    /// Waiting for a supervisor to take action.
    New = 0,

    /// Put aside by a supervisor.
    Delayed = 1,

    /// Rejected by a supervisor.
    Denied = 2,

    /// Executor is assigned and working on it.
    InWork = 3,

    /// Executor reported the work as done, supervisor has to verify it.
    Control = 4,

    /// Verified by a supervisor.
    Complete = 5,

    /// Withdrawn by its creator. Only used when cancellation is configured
    /// to have its own terminal status.
    Cancelled = 6,
}

impl Status {
    pub const ALL: [Self; 7] = [
        Self::New,
        Self::Delayed,
        Self::Denied,
        Self::InWork,
        Self::Control,
        Self::Complete,
        Self::Cancelled,
    ];
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    TryFromRepr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum Priority {
    #[default]
    Ordinary = 100,
    Medium = 200,
    High = 300,
    Urgent = 400,
    Critical = 500,
}

impl FromSql<'_> for Priority {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u16::try_from(repr)?;
        let priority = Self::try_from(repr).map_err(|_| "invalid priority")?;
        Ok(priority)
    }
}

impl ToSql for Priority {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::try_from((*self) as u16)?;
        repr.to_sql(ty, out)
    }
}

/// Ticket list as seen by a particular user.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Folder {
    /// Tickets the user is currently executing.
    Inbox,

    /// Tickets the user has created.
    Outbox,

    /// Tickets routed to departments the user supervises.
    Supervision,
}

impl Folder {
    fn condition(self) -> String {
        match self {
            Self::Inbox => format!(
                "t.executor_id = $1 AND t.status = {}",
                Status::InWork as u8,
            ),
            Self::Outbox => "t.creator_id = $1".to_string(),
            Self::Supervision => "t.department_id IN (\
                    SELECT department_id FROM department_supervisors \
                    WHERE user_id = $1)"
                .to_string(),
        }
    }
}

/// Optional narrowing of a [`Folder`] listing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Filter {
    pub department: Option<department::Id>,
    pub creator: Option<user::Id>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
}

const SELECT: &str = "\
    SELECT t.id, t.created_at, t.department_id, t.title, t.description, \
           t.creator_id, t.executor_id, t.status, t.deadline, t.priority, \
           ARRAY(SELECT a.attachment_id FROM ticket_attachments a \
                 WHERE a.ticket_id = t.id) AS attachment_ids \
    FROM tickets t";

const INSERT: &str = "\
    WITH t AS ( \
        INSERT INTO tickets (id, created_at, department_id, title, \
                             description, creator_id, executor_id, \
                             status, deadline, priority) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
        RETURNING id \
    ) \
    INSERT INTO ticket_attachments (ticket_id, attachment_id) \
    SELECT t.id, a.id FROM t, unnest($11::UUID[]) AS a(id)";

const FILTER: &str = "\
    ($2::UUID IS NULL OR t.department_id = $2) \
    AND ($3::UUID IS NULL OR t.creator_id = $3) \
    AND ($4::INT2 IS NULL OR t.status = $4) \
    AND ($5::INT2 IS NULL OR t.priority = $5)";

impl Client {
    pub async fn get_ticket_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Ticket>, Error> {
        let sql = format!("{SELECT} WHERE t.id = $1");
        Ok(self
            .0
            .query_opt(&sql, &[&id])
            .await?
            .map(|row| Ticket::from_row(&row)))
    }

    /// Stores a new ticket together with its attachment links. Existing
    /// tickets change only through [`Client::update_ticket_state`].
    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), Error> {
        let attachments = ticket.attachments.iter().collect::<Vec<_>>();
        self.0
            .execute(
                INSERT,
                &[
                    &ticket.id,
                    &ticket.created_at,
                    &ticket.department,
                    &ticket.title,
                    &ticket.description,
                    &ticket.creator,
                    &ticket.executor,
                    &ticket.status,
                    &ticket.deadline,
                    &ticket.priority,
                    &attachments,
                ],
            )
            .await
            .map(drop)
    }

    /// Stores the workflow fields of `ticket` only if the stored row still
    /// has the status and executor of `expected`.
    ///
    /// Returns `false` when another request got there first.
    pub async fn update_ticket_state(
        &self,
        ticket: &Ticket,
        expected: &Ticket,
    ) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET status = $2, \
                executor_id = $3 \
            WHERE id = $1 \
              AND status = $4 \
              AND executor_id IS NOT DISTINCT FROM $5";
        let updated = self
            .0
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.status,
                    &ticket.executor,
                    &expected.status,
                    &expected.executor,
                ],
            )
            .await?;
        Ok(updated == 1)
    }

    pub async fn get_tickets_page(
        &self,
        folder: Folder,
        user: user::Id,
        filter: &Filter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Ticket>, Error> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let sql = format!(
            "{SELECT} \
             WHERE {} AND {FILTER} \
             ORDER BY t.created_at DESC, \
                      t.id DESC \
             OFFSET $6 LIMIT $7",
            folder.condition(),
        );
        Ok(self
            .0
            .query(
                &sql,
                &[
                    &user,
                    &filter.department,
                    &filter.creator,
                    &filter.status,
                    &filter.priority,
                    &offset,
                    &limit,
                ],
            )
            .await?
            .iter()
            .map(Ticket::from_row)
            .collect())
    }

    pub async fn get_tickets_count(
        &self,
        folder: Folder,
        user: user::Id,
        filter: &Filter,
    ) -> Result<usize, Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM tickets t WHERE {} AND {FILTER}",
            folder.condition(),
        );
        let count = self
            .0
            .query_one(
                &sql,
                &[
                    &user,
                    &filter.department,
                    &filter.creator,
                    &filter.status,
                    &filter.priority,
                ],
            )
            .await?
            .get::<_, i64>(0);
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
