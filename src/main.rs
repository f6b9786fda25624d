use std::{
    collections::BTreeSet, error::Error, iter, sync::Arc, time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use itertools::Itertools as _;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset};
use tokio::{fs, net, task};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use helpdesk::{
    api, db,
    workflow::{
        self,
        display::{self, Locale},
        Action, Actor, Engine, Table,
    },
    Config,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // Only sound before any other thread is spawned.
    let utc_offset =
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let (db_client, db_connection) = db::connect(config.db).await?;

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            panic!("database connection failed: {e}");
        }
    });

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    tracing::info!(
        cancel = ?config.workflow.cancel,
        locale = ?config.display.locale,
        %utc_offset,
        "starting helpdesk on {}",
        config.http.server.addr,
    );

    let app = Router::new()
        .route("/auth", post(auth))
        .route("/user", get(get_user))
        .route("/department", get(list_departments))
        .route("/attachment", post(add_attachment))
        .route("/ticket", get(list_tickets).post(add_ticket))
        .route("/ticket/:id", get(get_ticket).patch(edit_ticket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(AppState {
            db_client,
            engine: Engine::new(Table::standard(config.workflow.cancel)),
            locale: config.display.locale,
            utc_offset,
            jwt_expiration_time: config.jwt.expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
            jwt_encoding_key: EncodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct AuthInput {
    login: String,
    password: String,
}

async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { login, password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    let password_hash = api::user::PasswordHash::new(&password);

    let user = state
        .db_client
        .get_user_by_login(&login)
        .await?
        .filter(|u| u.password_hash == password_hash)
        .ok_or(E::WrongLoginOrPassword)?;

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            user_id: user.id,
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    DbError(db::Error),
    InvalidToken,
    WrongLoginOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::WrongLoginOrPassword => StatusCode::FORBIDDEN,
        }
        .into_response()
    }
}

async fn get_user(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<api::user::Profile>, GetUserError> {
    use GetUserError as E;

    let my = state
        .db_client
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::UserNotFound)?;
    let departments = state.db_client.get_departments().await?;

    let (supervised, employed) = departments.iter().fold(
        (vec![], vec![]),
        |(mut supervised, mut employed), d| {
            if d.supervisors.contains(&my.id) {
                supervised.push(api::Department::from(d));
            }
            if d.employees.contains(&my.id) {
                employed.push(api::Department::from(d));
            }
            (supervised, employed)
        },
    );

    Ok(Json(api::user::Profile {
        user: api::User::from(&my),
        supervised_departments: supervised,
        employed_departments: employed,
    }))
}

#[derive(Debug, From)]
pub enum GetUserError {
    #[from]
    DbError(db::Error),
    UserNotFound,
}

impl IntoResponse for GetUserError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) | Self::UserNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

async fn list_departments(
    State(state): State<SharedAppState>,
    _: AuthClaims,
) -> Result<Json<Vec<api::Department>>, ListDepartmentsError> {
    let departments = state.db_client.get_departments().await?;
    Ok(Json(departments.iter().map(api::Department::from).collect()))
}

#[derive(Debug, From)]
pub enum ListDepartmentsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for ListDepartmentsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
struct AddAttachmentInput {
    name: String,
}

async fn add_attachment(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Json(AddAttachmentInput { name }): Json<AddAttachmentInput>,
) -> Result<Json<api::Attachment>, AddAttachmentError> {
    use AddAttachmentError as E;

    if name.trim().is_empty() {
        return Err(E::EmptyName);
    }

    let attachment = db::Attachment {
        id: db::attachment::Id::new(),
        name,
    };
    state.db_client.insert_attachment(&attachment).await?;

    Ok(Json(api::Attachment::from(attachment)))
}

#[derive(Debug, From)]
pub enum AddAttachmentError {
    #[from]
    DbError(db::Error),
    EmptyName,
}

impl IntoResponse for AddAttachmentError {
    fn into_response(self) -> Response {
        match self {
            Self::EmptyName => StatusCode::BAD_REQUEST,
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
struct ListTicketsInput {
    folder: api::ticket::Folder,
    offset: usize,
    limit: usize,
    department: Option<api::department::Id>,
    creator: Option<api::user::Id>,
    status: Option<api::ticket::Status>,
    priority: Option<api::ticket::Priority>,
}

async fn list_tickets(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Query(input): Query<ListTicketsInput>,
) -> Result<Json<api::ticket::List>, ListTicketsError> {
    use ListTicketsError as E;

    let filter = db::ticket::Filter {
        department: input.department,
        creator: input.creator,
        status: input.status,
        priority: input.priority,
    };

    let page_fut = state.db_client.get_tickets_page(
        input.folder,
        auth_claims.user_id,
        &filter,
        input.offset,
        input.limit,
    );
    let total_count_fut = state.db_client.get_tickets_count(
        input.folder,
        auth_claims.user_id,
        &filter,
    );
    let (page, total_count) = tokio::try_join!(page_fut, total_count_fut)?;

    let user_ids = page
        .iter()
        .map(|ticket| ticket.creator)
        .chain(page.iter().filter_map(|ticket| ticket.executor))
        .unique()
        .collect::<Vec<_>>();
    let (users, departments) = tokio::try_join!(
        state.db_client.get_users_by_ids(&user_ids),
        state.db_client.get_departments(),
    )?;

    let today = today(&state);
    let tickets = page
        .into_iter()
        .map(|ticket| {
            let creator = users
                .get(&ticket.creator)
                .ok_or(E::UserNotFound(ticket.creator))?;
            let executor = ticket
                .executor
                .map(|id| users.get(&id).ok_or(E::UserNotFound(id)))
                .transpose()?;
            let department = departments
                .iter()
                .find(|d| d.id == ticket.department)
                .ok_or(E::DepartmentNotFound(ticket.department))?;
            Ok::<_, E>(api::Ticket::new(
                ticket,
                api::Department::from(department),
                api::User::from(creator),
                executor.map(api::User::from),
                today,
                state.locale,
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(api::ticket::List {
        tickets,
        total_count,
    }))
}

#[derive(Debug, From)]
pub enum ListTicketsError {
    #[from]
    DbError(db::Error),
    DepartmentNotFound(api::department::Id),
    UserNotFound(api::user::Id),
}

impl IntoResponse for ListTicketsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_)
            | Self::DepartmentNotFound(_)
            | Self::UserNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTicketInput {
    department: api::department::Id,
    title: String,
    description: String,
    #[serde(default)]
    deadline: Option<Date>,
    #[serde(default)]
    priority: api::ticket::Priority,
    #[serde(default)]
    attachments: Vec<api::attachment::Id>,
}

#[tracing::instrument(skip_all, fields(user = %auth_claims.user_id))]
async fn add_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(input): Json<AddTicketInput>,
) -> Result<Json<api::ticket::Detail>, AddTicketError> {
    use AddTicketError as E;

    if input.title.trim().is_empty() || input.description.trim().is_empty() {
        return Err(E::TicketCannotBeCreated);
    }

    let attachments = input.attachments.into_iter().collect::<BTreeSet<_>>();
    let attachment_ids = attachments.iter().copied().collect::<Vec<_>>();
    let (my, department, known_attachments) = tokio::try_join!(
        state.db_client.get_user_by_id(auth_claims.user_id),
        state.db_client.get_department_by_id(input.department),
        state.db_client.get_attachments_by_ids(&attachment_ids),
    )?;
    let my = my.ok_or(E::UserNotFound)?;
    let department = department.ok_or(E::DepartmentNotFound)?;
    if known_attachments.len() != attachments.len() {
        return Err(E::AttachmentNotFound);
    }

    let ticket = db::Ticket {
        id: db::ticket::Id::new(),
        created_at: OffsetDateTime::now_utc(),
        department: department.id,
        title: input.title,
        description: input.description,
        creator: my.id,
        executor: None,
        status: db::ticket::Status::New,
        attachments,
        deadline: input.deadline,
        priority: input.priority,
    };

    state.db_client.insert_ticket(&ticket).await?;
    tracing::info!(ticket = %ticket.id, department = %department.id, "ticket created");

    let actor = Actor::resolve(&state.db_client, my.id).await?;
    Ok(Json(ticket_detail(&state, ticket, &actor).await?))
}

#[derive(Debug, From)]
pub enum AddTicketError {
    #[from]
    DbError(db::Error),
    #[from]
    View(ViewError),
    #[from]
    Workflow(workflow::Error),
    AttachmentNotFound,
    DepartmentNotFound,
    TicketCannotBeCreated,
    UserNotFound,
}

impl IntoResponse for AddTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::AttachmentNotFound
            | Self::DepartmentNotFound
            | Self::TicketCannotBeCreated => StatusCode::BAD_REQUEST,
            Self::DbError(_)
            | Self::View(_)
            | Self::Workflow(_)
            | Self::UserNotFound => {
                tracing::error!(error = ?self, "failed to create ticket");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
enum EditTicketInput {
    AssignExecutor { executor: api::user::Id },
    Delay,
    Deny,
    Refresh,
    SetDone,
    Complete,
    Cancel,
}

impl EditTicketInput {
    fn action(&self) -> Action {
        match self {
            Self::AssignExecutor { .. } => Action::AssignExecutor,
            Self::Delay => Action::Delay,
            Self::Deny => Action::Deny,
            Self::Refresh => Action::Refresh,
            Self::SetDone => Action::SetDone,
            Self::Complete => Action::Complete,
            Self::Cancel => Action::Cancel,
        }
    }

    fn executor(&self) -> Option<api::user::Id> {
        match self {
            Self::AssignExecutor { executor } => Some(*executor),
            _ => None,
        }
    }
}

#[tracing::instrument(skip_all, fields(ticket = %id, user = %auth_claims.user_id))]
async fn edit_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(op): Json<EditTicketInput>,
) -> Result<Json<api::ticket::Detail>, EditTicketError> {
    // Department relations are resolved on every request.
    let actor = Actor::resolve(&state.db_client, auth_claims.user_id).await?;
    let ticket = state
        .engine
        .execute(&state.db_client, id, op.action(), &actor, op.executor())
        .await?;

    Ok(Json(ticket_detail(&state, ticket, &actor).await?))
}

#[derive(Debug, From)]
pub enum EditTicketError {
    #[from]
    View(ViewError),
    #[from]
    Workflow(workflow::Error),
}

impl IntoResponse for EditTicketError {
    fn into_response(self) -> Response {
        use workflow::Error as W;

        let (status, e) = match self {
            Self::Workflow(e @ W::Forbidden { .. }) => (StatusCode::FORBIDDEN, e),
            Self::Workflow(
                e @ (W::InvalidTransition { .. } | W::InvalidAssignee { .. }),
            ) => (StatusCode::BAD_REQUEST, e),
            Self::Workflow(e @ W::NotFound(_)) => (StatusCode::NOT_FOUND, e),
            Self::Workflow(e @ W::Conflict(_)) => (StatusCode::CONFLICT, e),
            e @ (Self::Workflow(W::Store(_)) | Self::View(_)) => {
                tracing::error!(error = ?e, "failed to edit ticket");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        (status, e.to_string()).into_response()
    }
}

async fn get_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::ticket::Detail>, GetTicketError> {
    use GetTicketError as E;

    let ticket = state
        .db_client
        .get_ticket_by_id(id)
        .await?
        .ok_or(E::TicketNotFound)?;
    let actor = Actor::resolve(&state.db_client, auth_claims.user_id).await?;

    Ok(Json(ticket_detail(&state, ticket, &actor).await?))
}

#[derive(Debug, From)]
pub enum GetTicketError {
    #[from]
    DbError(db::Error),
    #[from]
    View(ViewError),
    #[from]
    Workflow(workflow::Error),
    TicketNotFound,
}

impl IntoResponse for GetTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::TicketNotFound => StatusCode::NOT_FOUND,
            Self::DbError(_) | Self::View(_) | Self::Workflow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

/// Gathers everything `actor` gets to see about `ticket`.
async fn ticket_detail(
    state: &AppState,
    ticket: db::Ticket,
    actor: &Actor,
) -> Result<api::ticket::Detail, ViewError> {
    use ViewError as E;

    let actions = state.engine.available_actions(&ticket, actor);

    let department = state
        .db_client
        .get_department_by_id(ticket.department)
        .await?
        .ok_or(E::DepartmentNotFound(ticket.department))?;
    let candidates: Vec<api::user::Id> =
        if actions.contains(Action::AssignExecutor) {
            department.employees.iter().copied().collect()
        } else {
            vec![]
        };

    let user_ids = iter::once(ticket.creator)
        .chain(ticket.executor)
        .chain(candidates.iter().copied())
        .unique()
        .collect::<Vec<_>>();
    let (users, attachments) = tokio::try_join!(
        state.db_client.get_users_by_ids(&user_ids),
        state.db_client.get_attachments_of(ticket.id),
    )?;
    let user = |id| users.get(&id).map(api::User::from).ok_or(E::UserNotFound(id));

    let creator = user(ticket.creator)?;
    let executor = ticket.executor.map(user).transpose()?;
    let candidates = candidates
        .into_iter()
        .map(user)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(api::ticket::Detail {
        ticket: api::Ticket::new(
            ticket,
            api::Department::from(&department),
            creator,
            executor,
            today(state),
            state.locale,
        ),
        attachments: attachments.into_iter().map(api::Attachment::from).collect(),
        actions,
        candidates,
    })
}

#[derive(Debug, From)]
pub enum ViewError {
    #[from]
    DbError(db::Error),
    DepartmentNotFound(api::department::Id),
    UserNotFound(api::user::Id),
}

fn today(state: &AppState) -> Date {
    display::local_date(OffsetDateTime::now_utc(), state.utc_offset)
}

type SharedAppState = Arc<AppState>;

struct AppState {
    db_client: db::Client,

    engine: Engine,

    locale: Locale,

    /// Offset of the server's local time, dates are derived in it.
    utc_offset: UtcOffset,

    jwt_expiration_time: Duration,

    jwt_decoding_key: DecodingKey,

    jwt_encoding_key: EncodingKey,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    user_id: api::user::Id,
    exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
