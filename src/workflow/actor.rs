use std::collections::BTreeSet;

use crate::db::{department, ticket::Ticket, user};

use super::{Error, Store};

/// Authenticated user together with the departments they are related to,
/// resolved for the duration of a single request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Actor {
    pub user: user::Id,
    pub supervised: BTreeSet<department::Id>,
    pub employed: BTreeSet<department::Id>,
}

impl Actor {
    pub fn new(user: user::Id) -> Self {
        Self {
            user,
            supervised: BTreeSet::new(),
            employed: BTreeSet::new(),
        }
    }

    pub fn supervising(
        mut self,
        departments: impl IntoIterator<Item = department::Id>,
    ) -> Self {
        self.supervised.extend(departments);
        self
    }

    pub fn employed_in(
        mut self,
        departments: impl IntoIterator<Item = department::Id>,
    ) -> Self {
        self.employed.extend(departments);
        self
    }

    /// Loads the department relations of `user` from the `store`.
    pub async fn resolve<S: Store + ?Sized>(
        store: &S,
        user: user::Id,
    ) -> Result<Self, Error> {
        let (supervised, employed) = futures::try_join!(
            store.list_departments_supervised_by(user),
            store.list_departments_employing(user),
        )
        .map_err(Error::store)?;
        Ok(Self::new(user).supervising(supervised).employed_in(employed))
    }

    pub fn is_creator(&self, ticket: &Ticket) -> bool {
        ticket.creator == self.user
    }

    pub fn is_executor(&self, ticket: &Ticket) -> bool {
        ticket.executor == Some(self.user)
    }

    pub fn is_supervisor(&self, ticket: &Ticket) -> bool {
        self.supervised.contains(&ticket.department)
    }
}
