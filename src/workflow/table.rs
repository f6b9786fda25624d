//! Declarative description of the ticket lifecycle.

use std::fmt;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::db::ticket::{Status, Ticket};

use super::Actor;

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    #[display("assign executor")]
    AssignExecutor,
    #[display("delay")]
    Delay,
    #[display("deny")]
    Deny,
    #[display("refresh")]
    Refresh,
    #[display("set done")]
    SetDone,
    #[display("complete")]
    Complete,
    #[display("cancel")]
    Cancel,
}

impl Action {
    pub const ALL: [Self; 7] = [
        Self::AssignExecutor,
        Self::Delay,
        Self::Deny,
        Self::Refresh,
        Self::SetDone,
        Self::Complete,
        Self::Cancel,
    ];
}

/// Role an actor must hold relative to a ticket.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Gate {
    #[display("creator")]
    Creator,
    #[display("executor")]
    Executor,
    #[display("supervisor")]
    Supervisor,
    #[display("creator or supervisor")]
    CreatorOrSupervisor,
}

impl Gate {
    pub fn admits(self, ticket: &Ticket, actor: &Actor) -> bool {
        match self {
            Self::Creator => actor.is_creator(ticket),
            Self::Executor => actor.is_executor(ticket),
            Self::Supervisor => actor.is_supervisor(ticket),
            Self::CreatorOrSupervisor => {
                actor.is_creator(ticket) || actor.is_supervisor(ticket)
            }
        }
    }
}

/// Set of [`Status`]es packed into a bitmask.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct StatusSet(u8);

impl StatusSet {
    pub const fn of(statuses: &[Status]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < statuses.len() {
            bits |= 1u8 << statuses[i] as u8;
            i += 1;
        }
        Self(bits)
    }

    pub const fn contains(self, status: Status) -> bool {
        (self.0 & (1u8 << status as u8)) != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Status> {
        Status::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl fmt::Debug for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Where a ticket cancelled by its creator ends up.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    /// Cancelled tickets are simply completed; six statuses are in use.
    #[default]
    Complete,

    /// Cancelled tickets get a terminal status of their own.
    Cancelled,
}

impl CancelPolicy {
    pub fn target(self) -> Status {
        match self {
            Self::Complete => Status::Complete,
            Self::Cancelled => Status::Cancelled,
        }
    }

    /// Statuses no further work is expected from until refreshed.
    pub fn terminal(self) -> StatusSet {
        match self {
            Self::Complete => StatusSet::of(&[Status::Denied, Status::Complete]),
            Self::Cancelled => StatusSet::of(&[
                Status::Denied,
                Status::Complete,
                Status::Cancelled,
            ]),
        }
    }

    /// Statuses a ticket can actually be in.
    pub fn statuses(self) -> StatusSet {
        match self {
            Self::Complete => StatusSet::of(&Status::ALL[..6]),
            Self::Cancelled => StatusSet::of(&Status::ALL),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rule {
    pub action: Action,
    pub sources: StatusSet,
    pub gate: Gate,
    pub target: Status,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum TableError {
    #[display("action `{_0}` has more than one rule")]
    DuplicateRule(Action),
}

impl std::error::Error for TableError {}

/// Immutable mapping from [`Action`] to its [`Rule`].
#[derive(Clone, Debug)]
pub struct Table {
    rules: Vec<Rule>,
}

impl Table {
    pub fn new(rules: Vec<Rule>) -> Result<Self, TableError> {
        for (i, rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|r| r.action == rule.action) {
                return Err(TableError::DuplicateRule(rule.action));
            }
        }
        Ok(Self { rules })
    }

    /// The helpdesk lifecycle: supervisors take a `NEW` ticket into work by
    /// assigning an executor (or delay/deny it), the executor reports it done
    /// and a supervisor verifies it. Finished and put aside tickets can be
    /// refreshed back to `NEW`.
    pub fn standard(cancel: CancelPolicy) -> Self {
        use Status as S;

        let refreshable = match cancel {
            CancelPolicy::Complete => {
                StatusSet::of(&[S::Delayed, S::Denied, S::Complete])
            }
            CancelPolicy::Cancelled => StatusSet::of(&[
                S::Delayed,
                S::Denied,
                S::Complete,
                S::Cancelled,
            ]),
        };
        let terminal = cancel.terminal();
        let cancellable = StatusSet(cancel.statuses().0 & !terminal.0);

        let rules = vec![
            Rule {
                action: Action::AssignExecutor,
                sources: StatusSet::of(&[S::New, S::InWork]),
                gate: Gate::Supervisor,
                target: S::InWork,
            },
            Rule {
                action: Action::Delay,
                sources: StatusSet::of(&[S::New, S::InWork]),
                gate: Gate::Supervisor,
                target: S::Delayed,
            },
            Rule {
                action: Action::Deny,
                sources: StatusSet::of(&[S::New, S::InWork, S::Delayed]),
                gate: Gate::Supervisor,
                target: S::Denied,
            },
            Rule {
                action: Action::Refresh,
                sources: refreshable,
                gate: Gate::CreatorOrSupervisor,
                target: S::New,
            },
            Rule {
                action: Action::SetDone,
                sources: StatusSet::of(&[S::InWork]),
                gate: Gate::Executor,
                target: S::Control,
            },
            Rule {
                action: Action::Complete,
                sources: StatusSet::of(&[S::Control]),
                gate: Gate::Supervisor,
                target: S::Complete,
            },
            Rule {
                action: Action::Cancel,
                sources: cancellable,
                gate: Gate::Creator,
                target: cancel.target(),
            },
        ];
        Self { rules }
    }

    pub fn rule(&self, action: Action) -> Option<&Rule> {
        self.rules.iter().find(|r| r.action == action)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::standard(CancelPolicy::default())
    }
}
