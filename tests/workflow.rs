use std::{
    collections::{BTreeSet, HashMap},
    convert::Infallible,
    sync::Mutex,
};

use async_trait::async_trait;
use helpdesk::{
    db::{
        department,
        ticket::{self, Priority, Status, Ticket},
        user,
    },
    workflow::{
        Action, Actor, CancelPolicy, Engine, Error, Gate, Params, Rule, Store,
        StatusSet, Table,
    },
};
use time::{macros::date, OffsetDateTime};

const IT: u128 = 1;
const ACCOUNTING: u128 = 2;

const ALICE: u128 = 1; // creator
const BOB: u128 = 2; // IT supervisor
const CHARLIE: u128 = 3; // IT employee
const DAVE: u128 = 4; // IT employee
const ERIN: u128 = 5; // Accounting supervisor

fn ticket(status: Status, executor: Option<u128>) -> Ticket {
    Ticket {
        id: ticket::Id::from(1),
        created_at: OffsetDateTime::UNIX_EPOCH,
        department: department::Id::from(IT),
        title: "Printer".to_string(),
        description: "Out of toner".to_string(),
        creator: user::Id::from(ALICE),
        executor: executor.map(user::Id::from),
        status,
        attachments: BTreeSet::new(),
        deadline: Some(date!(2024 - 03 - 20)),
        priority: Priority::High,
    }
}

fn actor(user: u128) -> Actor {
    let actor = Actor::new(user::Id::from(user));
    match user {
        BOB => actor.supervising([department::Id::from(IT)]),
        CHARLIE | DAVE => actor.employed_in([department::Id::from(IT)]),
        ERIN => actor.supervising([department::Id::from(ACCOUNTING)]),
        _ => actor,
    }
}

fn it_employees() -> Params {
    Params {
        executor: None,
        employees: [CHARLIE, DAVE].map(user::Id::from).into(),
    }
}

fn valid_params(ticket: &Ticket) -> Params {
    // Someone other than the current executor, so reassignment is legal.
    let executor = if ticket.executor == Some(user::Id::from(CHARLIE)) {
        DAVE
    } else {
        CHARLIE
    };
    Params {
        executor: Some(user::Id::from(executor)),
        ..it_employees()
    }
}

#[test]
fn supervisor_assigns_executor_to_new_ticket() {
    let engine = Engine::default();
    let before = ticket(Status::New, None);

    let after = engine
        .apply(
            &before,
            Action::AssignExecutor,
            &actor(BOB),
            &Params::assign(user::Id::from(CHARLIE), it_employees().employees),
        )
        .unwrap();

    assert_eq!(after.status, Status::InWork);
    assert_eq!(after.executor, Some(user::Id::from(CHARLIE)));
}

#[test]
fn executor_sets_ticket_done() {
    let engine = Engine::default();
    let before = ticket(Status::InWork, Some(CHARLIE));

    let after = engine
        .apply(&before, Action::SetDone, &actor(CHARLIE), &Params::default())
        .unwrap();

    assert_eq!(after.status, Status::Control);
    assert_eq!(after.executor, before.executor);
}

#[test]
fn foreign_supervisor_cannot_complete() {
    let engine = Engine::default();
    let before = ticket(Status::Control, Some(CHARLIE));

    let err = engine
        .apply(&before, Action::Complete, &actor(ERIN), &Params::default())
        .unwrap_err();

    assert!(
        matches!(err, Error::Forbidden { gate: Gate::Supervisor, .. }),
        "{err:?}",
    );
    assert_eq!(before.status, Status::Control);
}

#[test]
fn creator_refreshes_denied_ticket() {
    let engine = Engine::default();
    let before = ticket(Status::Denied, None);

    let after = engine
        .apply(&before, Action::Refresh, &actor(ALICE), &Params::default())
        .unwrap();

    assert_eq!(after.status, Status::New);
}

#[test]
fn supervisor_refreshes_complete_but_not_in_work_ticket() {
    let engine = Engine::default();

    let after = engine
        .apply(
            &ticket(Status::Complete, Some(CHARLIE)),
            Action::Refresh,
            &actor(BOB),
            &Params::default(),
        )
        .unwrap();
    assert_eq!(after.status, Status::New);

    let err = engine
        .apply(
            &ticket(Status::InWork, Some(CHARLIE)),
            Action::Refresh,
            &actor(BOB),
            &Params::default(),
        )
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::InvalidTransition {
                action: Action::Refresh,
                status: Status::InWork,
                ..
            }
        ),
        "{err:?}",
    );
}

#[test]
fn rejects_assignee_outside_of_department() {
    let engine = Engine::default();

    for executor in [ALICE, BOB, ERIN] {
        let err = engine
            .apply(
                &ticket(Status::New, None),
                Action::AssignExecutor,
                &actor(BOB),
                &Params {
                    executor: Some(user::Id::from(executor)),
                    ..it_employees()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAssignee { .. }), "{err:?}");
    }
}

#[test]
fn rejects_assignment_without_executor() {
    let err = Engine::default()
        .apply(
            &ticket(Status::New, None),
            Action::AssignExecutor,
            &actor(BOB),
            &it_employees(),
        )
        .unwrap_err();
    assert!(
        matches!(err, Error::InvalidAssignee { executor: None, .. }),
        "{err:?}",
    );
}

#[test]
fn reassigns_executor_of_ticket_in_work() {
    let engine = Engine::default();
    let before = ticket(Status::InWork, Some(CHARLIE));

    let after = engine
        .apply(
            &before,
            Action::AssignExecutor,
            &actor(BOB),
            &valid_params(&before),
        )
        .unwrap();
    assert_eq!(after.executor, Some(user::Id::from(DAVE)));

    let err = engine
        .apply(
            &after,
            Action::AssignExecutor,
            &actor(BOB),
            &Params::assign(user::Id::from(DAVE), it_employees().employees),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "{err:?}");
}

#[test]
fn repeated_submission_is_rejected() {
    let engine = Engine::default();
    let cases = [
        (Status::New, Action::Delay, BOB),
        (Status::New, Action::Deny, BOB),
        (Status::InWork, Action::SetDone, CHARLIE),
        (Status::Control, Action::Complete, BOB),
        (Status::Denied, Action::Refresh, ALICE),
        (Status::New, Action::Cancel, ALICE),
    ];
    for (status, action, user) in cases {
        let once = engine
            .apply(&ticket(status, Some(CHARLIE)), action, &actor(user), &Params::default())
            .unwrap();
        let err = engine
            .apply(&once, action, &actor(user), &Params::default())
            .unwrap_err();
        assert!(
            matches!(err, Error::InvalidTransition { .. }),
            "{action} twice from {status:?}: {err:?}",
        );
    }
}

#[test]
fn only_creator_cancels() {
    let engine = Engine::default();
    let before = ticket(Status::InWork, Some(CHARLIE));

    for user in [BOB, CHARLIE, ERIN] {
        let err = engine
            .apply(&before, Action::Cancel, &actor(user), &Params::default())
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");
    }

    let after = engine
        .apply(&before, Action::Cancel, &actor(ALICE), &Params::default())
        .unwrap();
    assert_eq!(after.status, Status::Complete);
}

#[test]
fn cancels_into_dedicated_status() {
    let engine = Engine::new(Table::standard(CancelPolicy::Cancelled));

    let cancelled = engine
        .apply(
            &ticket(Status::Delayed, None),
            Action::Cancel,
            &actor(ALICE),
            &Params::default(),
        )
        .unwrap();
    assert_eq!(cancelled.status, Status::Cancelled);

    let available = engine.available_actions(&cancelled, &actor(ALICE));
    assert_eq!(available.actions, BTreeSet::from([Action::Refresh]));
}

#[test]
fn terminal_tickets_cannot_be_cancelled() {
    for policy in [CancelPolicy::Complete, CancelPolicy::Cancelled] {
        let engine = Engine::new(Table::standard(policy));
        for status in [Status::Denied, Status::Complete] {
            let err = engine
                .apply(
                    &ticket(status, None),
                    Action::Cancel,
                    &actor(ALICE),
                    &Params::default(),
                )
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }), "{err:?}");
        }
    }
}

#[test]
fn available_actions_match_apply() {
    let users = [ALICE, BOB, CHARLIE, DAVE, ERIN];
    for policy in [CancelPolicy::Complete, CancelPolicy::Cancelled] {
        let engine = Engine::new(Table::standard(policy));
        for status in policy.statuses().iter() {
            for executor in [None, Some(CHARLIE)] {
                let before = ticket(status, executor);
                for user in users {
                    let actor = actor(user);
                    let available = engine.available_actions(&before, &actor);
                    assert_eq!(available.can_manage, user == BOB);

                    for action in Action::ALL {
                        let params = valid_params(&before);
                        let result =
                            engine.apply(&before, action, &actor, &params);
                        assert_eq!(
                            available.contains(action),
                            result.is_ok(),
                            "{action} by {user} from {status:?}: {result:?}",
                        );

                        let rule = engine.table().rule(action).unwrap();
                        match result {
                            Ok(after) => {
                                assert_eq!(after.status, rule.target);
                                let mut expected = before.clone();
                                expected.status = rule.target;
                                if action == Action::AssignExecutor {
                                    expected.executor = params.executor;
                                }
                                assert_eq!(after, expected);
                            }
                            Err(Error::Forbidden { .. }) => {
                                assert!(!rule.gate.admits(&before, &actor));
                            }
                            Err(Error::InvalidTransition { .. }) => {
                                assert!(rule.gate.admits(&before, &actor));
                                assert!(!rule.sources.contains(status));
                            }
                            Err(e) => panic!("unexpected {e:?}"),
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn injected_table_replaces_standard_one() {
    let table = Table::new(vec![Rule {
        action: Action::Complete,
        sources: StatusSet::of(&[Status::InWork]),
        gate: Gate::Executor,
        target: Status::Complete,
    }])
    .unwrap();
    let engine = Engine::new(table);
    let before = ticket(Status::InWork, Some(CHARLIE));

    let after = engine
        .apply(&before, Action::Complete, &actor(CHARLIE), &Params::default())
        .unwrap();
    assert_eq!(after.status, Status::Complete);

    let err = engine
        .apply(&before, Action::SetDone, &actor(CHARLIE), &Params::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "{err:?}");
}

#[derive(Default)]
struct MemoryStore {
    tickets: Mutex<HashMap<ticket::Id, Ticket>>,

    /// Returned by `get_ticket` instead of the stored ticket, imitating a
    /// concurrent request that changed the ticket after it was read.
    stale: Option<Ticket>,
}

impl MemoryStore {
    fn with(ticket: Ticket) -> Self {
        let store = Self::default();
        store.tickets.lock().unwrap().insert(ticket.id, ticket);
        store
    }

    fn stored(&self, id: ticket::Id) -> Option<Ticket> {
        self.tickets.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Error = Infallible;

    async fn get_ticket(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Self::Error> {
        Ok(self.stale.clone().or_else(|| self.stored(id)))
    }

    async fn save_ticket(
        &self,
        ticket: &Ticket,
        expected: &Ticket,
    ) -> Result<bool, Self::Error> {
        let mut tickets = self.tickets.lock().unwrap();
        match tickets.get_mut(&ticket.id) {
            Some(stored)
                if stored.status == expected.status
                    && stored.executor == expected.executor =>
            {
                *stored = ticket.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_departments_supervised_by(
        &self,
        user: user::Id,
    ) -> Result<Vec<department::Id>, Self::Error> {
        Ok(actor_by_id(user).supervised.into_iter().collect())
    }

    async fn list_departments_employing(
        &self,
        user: user::Id,
    ) -> Result<Vec<department::Id>, Self::Error> {
        Ok(actor_by_id(user).employed.into_iter().collect())
    }

    async fn list_employees_of(
        &self,
        department: department::Id,
    ) -> Result<Vec<user::Id>, Self::Error> {
        Ok(if department == department::Id::from(IT) {
            [CHARLIE, DAVE].map(user::Id::from).to_vec()
        } else {
            vec![]
        })
    }
}

fn actor_by_id(id: user::Id) -> Actor {
    [ALICE, BOB, CHARLIE, DAVE, ERIN]
        .into_iter()
        .find(|u| user::Id::from(*u) == id)
        .map(actor)
        .unwrap_or_else(|| Actor::new(id))
}

#[tokio::test]
async fn resolves_actor_from_store() {
    let store = MemoryStore::default();

    let bob = Actor::resolve(&store, user::Id::from(BOB)).await.unwrap();
    assert_eq!(bob, actor(BOB));

    let charlie = Actor::resolve(&store, user::Id::from(CHARLIE)).await.unwrap();
    assert!(charlie.supervised.is_empty());
    assert!(charlie.employed.contains(&department::Id::from(IT)));
}

#[tokio::test]
async fn executes_and_saves_assignment() {
    let store = MemoryStore::with(ticket(Status::New, None));
    let engine = Engine::default();
    let id = ticket::Id::from(1);

    let updated = engine
        .execute(
            &store,
            id,
            Action::AssignExecutor,
            &actor(BOB),
            Some(user::Id::from(DAVE)),
        )
        .await
        .unwrap();

    assert_eq!(updated.status, Status::InWork);
    assert_eq!(store.stored(id), Some(updated));
}

#[tokio::test]
async fn execute_loads_employees_of_ticket_department() {
    let mut ticket = ticket(Status::New, None);
    ticket.department = department::Id::from(ACCOUNTING);
    let store = MemoryStore::with(ticket.clone());
    let erin = actor(ERIN);

    let err = Engine::default()
        .execute(
            &store,
            ticket.id,
            Action::AssignExecutor,
            &erin,
            Some(user::Id::from(CHARLIE)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidAssignee { .. }), "{err:?}");
    assert_eq!(store.stored(ticket.id), Some(ticket));
}

#[tokio::test]
async fn execute_reports_missing_ticket() {
    let store = MemoryStore::default();

    let err = Engine::default()
        .execute(
            &store,
            ticket::Id::from(42),
            Action::Delay,
            &actor(BOB),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn execute_does_not_overwrite_concurrent_change() {
    let mut store = MemoryStore::with(ticket(Status::InWork, Some(DAVE)));
    store.stale = Some(ticket(Status::New, None));
    let id = ticket::Id::from(1);

    let err = Engine::default()
        .execute(
            &store,
            id,
            Action::AssignExecutor,
            &actor(BOB),
            Some(user::Id::from(CHARLIE)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)), "{err:?}");
    assert_eq!(store.stored(id), Some(ticket(Status::InWork, Some(DAVE))));
}

#[tokio::test]
async fn execute_leaves_ticket_untouched_on_rejection() {
    let store = MemoryStore::with(ticket(Status::Control, Some(CHARLIE)));
    let id = ticket::Id::from(1);

    let err = Engine::default()
        .execute(&store, id, Action::Complete, &actor(CHARLIE), None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");
    assert_eq!(
        store.stored(id).map(|t| t.status),
        Some(Status::Control),
    );
}
