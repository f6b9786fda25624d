use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    api, db,
    workflow::{
        display::{self, DeadlineUrgency, Locale},
        Available,
    },
};

pub use crate::db::ticket::{Folder, Id, Priority, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub created_at: OffsetDateTime,
    pub department: api::Department,
    pub title: String,
    pub description: String,
    pub creator: api::User,
    pub executor: Option<api::User>,
    pub status: Status,
    pub status_label: String,
    pub deadline: Option<Date>,
    pub priority: Priority,
    pub priority_label: String,
    pub days_left: Option<i64>,
    pub deadline_urgency: Option<DeadlineUrgency>,
    pub remaining: Option<String>,
}

impl Ticket {
    pub fn new(
        ticket: db::Ticket,
        department: api::Department,
        creator: api::User,
        executor: Option<api::User>,
        today: Date,
        locale: Locale,
    ) -> Self {
        Self {
            days_left: display::days_left(&ticket, today),
            deadline_urgency: display::deadline_urgency(&ticket, today),
            remaining: display::remaining(&ticket, today, locale),
            status_label: ticket.status.label(locale).to_string(),
            priority_label: ticket.priority.label(locale).to_string(),
            id: ticket.id,
            created_at: ticket.created_at,
            department,
            title: ticket.title,
            description: ticket.description,
            creator,
            executor,
            status: ticket.status,
            deadline: ticket.deadline,
            priority: ticket.priority,
        }
    }
}

/// Single ticket as shown to a particular viewer.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub attachments: Vec<api::Attachment>,

    /// What the viewer may do with the ticket.
    pub actions: Available,

    /// Employees who can be assigned as executor. Empty unless the viewer
    /// may assign one.
    pub candidates: Vec<api::User>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub tickets: Vec<Ticket>,
    pub total_count: usize,
}
