//! Ticket lifecycle: who may do what to a ticket, and what happens to it.
//!
//! The [`Table`] is the single source of truth both for the actions offered
//! to a viewer ([`Engine::available_actions`]) and for the actions accepted
//! from them ([`Engine::apply`]).

mod actor;
pub mod display;
mod table;

use std::{collections::BTreeSet, error::Error as StdError};

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::db::{
    self, department,
    ticket::{self, Status, Ticket},
    user,
};

pub use self::{
    actor::Actor,
    table::{Action, CancelPolicy, Gate, Rule, StatusSet, Table, TableError},
};

/// Persistence the engine needs to act on a ticket.
#[async_trait]
pub trait Store: Sync {
    type Error: StdError + Send + Sync + 'static;

    async fn get_ticket(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Self::Error>;

    /// Saves `ticket` unless its stored state differs from `expected`.
    /// Returns whether the ticket was saved.
    async fn save_ticket(
        &self,
        ticket: &Ticket,
        expected: &Ticket,
    ) -> Result<bool, Self::Error>;

    async fn list_departments_supervised_by(
        &self,
        user: user::Id,
    ) -> Result<Vec<department::Id>, Self::Error>;

    async fn list_departments_employing(
        &self,
        user: user::Id,
    ) -> Result<Vec<department::Id>, Self::Error>;

    async fn list_employees_of(
        &self,
        department: department::Id,
    ) -> Result<Vec<user::Id>, Self::Error>;
}

#[async_trait]
impl Store for db::Client {
    type Error = db::Error;

    async fn get_ticket(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Self::Error> {
        self.get_ticket_by_id(id).await
    }

    async fn save_ticket(
        &self,
        ticket: &Ticket,
        expected: &Ticket,
    ) -> Result<bool, Self::Error> {
        self.update_ticket_state(ticket, expected).await
    }

    async fn list_departments_supervised_by(
        &self,
        user: user::Id,
    ) -> Result<Vec<department::Id>, Self::Error> {
        self.get_departments_supervised_by(user).await
    }

    async fn list_departments_employing(
        &self,
        user: user::Id,
    ) -> Result<Vec<department::Id>, Self::Error> {
        self.get_departments_employing(user).await
    }

    async fn list_employees_of(
        &self,
        department: department::Id,
    ) -> Result<Vec<user::Id>, Self::Error> {
        self.get_employees_of(department).await
    }
}

#[derive(Debug, Display)]
pub enum Error {
    /// Actor doesn't hold the role the action requires.
    #[display("{actor} may not {action} ticket {ticket}: {gate} only")]
    Forbidden {
        ticket: ticket::Id,
        action: Action,
        gate: Gate,
        actor: user::Id,
    },

    /// Action isn't legal from the current status.
    #[display("cannot {action} ticket {ticket} with status {status:?}")]
    InvalidTransition {
        ticket: ticket::Id,
        action: Action,
        status: Status,
    },

    /// Proposed executor is missing or isn't an employee of the ticket's
    /// department.
    #[display("{executor:?} cannot be assigned to ticket {ticket}")]
    InvalidAssignee {
        ticket: ticket::Id,
        executor: Option<user::Id>,
    },

    #[display("ticket {_0} not found")]
    NotFound(ticket::Id),

    /// Ticket changed between reading and saving it.
    #[display("ticket {_0} was changed concurrently")]
    Conflict(ticket::Id),

    #[display("store failure: {_0}")]
    Store(Box<dyn StdError + Send + Sync>),
}

impl Error {
    fn store(e: impl StdError + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(e))
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Extra input of an [`Action`].
#[derive(Clone, Debug, Default)]
pub struct Params {
    /// Proposed executor for [`Action::AssignExecutor`].
    pub executor: Option<user::Id>,

    /// Employees of the ticket's department.
    pub employees: BTreeSet<user::Id>,
}

impl Params {
    pub fn assign(
        executor: user::Id,
        employees: impl IntoIterator<Item = user::Id>,
    ) -> Self {
        Self {
            executor: Some(executor),
            employees: employees.into_iter().collect(),
        }
    }
}

/// Actions a particular actor may take on a particular ticket.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Available {
    /// Whether the actor supervises the ticket's department.
    pub can_manage: bool,
    pub actions: BTreeSet<Action>,
}

impl Available {
    pub fn contains(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

pub struct Engine {
    table: Table,
}

impl Engine {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn available_actions(&self, ticket: &Ticket, actor: &Actor) -> Available {
        Available {
            can_manage: actor.is_supervisor(ticket),
            actions: self
                .table
                .rules()
                .iter()
                .filter(|r| {
                    r.sources.contains(ticket.status)
                        && r.gate.admits(ticket, actor)
                })
                .map(|r| r.action)
                .collect(),
        }
    }

    /// Returns `ticket` as it is after `actor` performs `action` on it.
    ///
    /// The role is checked before the status, so an actor who may never
    /// perform the action gets [`Error::Forbidden`] regardless of status.
    pub fn apply(
        &self,
        ticket: &Ticket,
        action: Action,
        actor: &Actor,
        params: &Params,
    ) -> Result<Ticket, Error> {
        use Error as E;

        let invalid_transition = || E::InvalidTransition {
            ticket: ticket.id,
            action,
            status: ticket.status,
        };

        let rule = self.table.rule(action).ok_or_else(invalid_transition)?;
        if !rule.gate.admits(ticket, actor) {
            return Err(E::Forbidden {
                ticket: ticket.id,
                action,
                gate: rule.gate,
                actor: actor.user,
            });
        }
        if !rule.sources.contains(ticket.status) {
            return Err(invalid_transition());
        }

        let mut next = ticket.clone();
        next.status = rule.target;

        if action == Action::AssignExecutor {
            let executor = params
                .executor
                .filter(|e| params.employees.contains(e))
                .ok_or(E::InvalidAssignee {
                    ticket: ticket.id,
                    executor: params.executor,
                })?;
            // Re-submitting the same assignment.
            if ticket.status == rule.target && ticket.executor == Some(executor)
            {
                return Err(invalid_transition());
            }
            next.executor = Some(executor);
        }

        Ok(next)
    }

    /// Performs `action` on the freshly read ticket `id` and saves the
    /// result, as long as nobody else changed the ticket in between.
    pub async fn execute<S: Store + ?Sized>(
        &self,
        store: &S,
        id: ticket::Id,
        action: Action,
        actor: &Actor,
        executor: Option<user::Id>,
    ) -> Result<Ticket, Error> {
        let current = store
            .get_ticket(id)
            .await
            .map_err(Error::store)?
            .ok_or(Error::NotFound(id))?;

        let mut params = Params {
            executor,
            ..Params::default()
        };
        if action == Action::AssignExecutor && executor.is_some() {
            params.employees = store
                .list_employees_of(current.department)
                .await
                .map_err(Error::store)?
                .into_iter()
                .collect();
        }

        let next = self
            .apply(&current, action, actor, &params)
            .inspect_err(|e| tracing::debug!(user = %actor.user, "{e}"))?;

        if !store
            .save_ticket(&next, &current)
            .await
            .map_err(Error::store)?
        {
            tracing::warn!(ticket = %id, %action, "lost update prevented");
            return Err(Error::Conflict(id));
        }

        tracing::info!(
            ticket = %id,
            %action,
            user = %actor.user,
            from = ?current.status,
            to = ?next.status,
            "ticket transitioned",
        );
        Ok(next)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Table::default())
    }
}
