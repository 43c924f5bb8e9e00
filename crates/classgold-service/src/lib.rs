#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use classgold_adapters::JsonFileStore;
use classgold_core::{
    AcceptOutcome, BalanceDrift, Economy, EconomyError, EconomySnapshot, Level, MemoryStore,
    Product, PurchaseOutcome, Quest, QuestProgressView, QuestSubmission, RecordStore,
    ReviewOutcome, SeedData, StoreError, SubmissionDraft, SubmissionStatus, SubmitOutcome,
    Transaction, TransactionType, User,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Record store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// Keep every collection in process memory only.
    Memory,
    /// Persist each collection as a JSON file under `dir`.
    JsonFile { dir: PathBuf },
}

impl StoreConfig {
    pub fn json_file(dir: impl Into<PathBuf>) -> Self {
        Self::JsonFile { dir: dir.into() }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::JsonFile { .. } => "json-file",
        }
    }

    fn open(&self) -> Result<Arc<dyn RecordStore>, StoreError> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryStore::new()),
            Self::JsonFile { dir } => Arc::new(JsonFileStore::open(dir)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub seed: SeedData,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::Memory,
            seed: SeedData::default(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub economy: Arc<Economy>,
}

impl ServiceState {
    pub fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let ServiceConfig { store, seed } = config;
        seed.validate()?;
        let backend = store.open()?;
        let economy = Economy::new(backend, seed);

        // Touch every collection so an empty store is seeded at startup.
        let users = economy.users()?;
        economy.products()?;
        economy.quests()?;
        economy.submissions()?;
        economy.transactions()?;
        info!(
            store = economy.store_label(),
            users = users.len(),
            "Economy ready"
        );

        Ok(Self {
            economy: Arc::new(economy),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/users", get(list_users))
        .route("/v1/users/:user_id/progress", get(user_progress))
        .route("/v1/users/:user_id/transactions", post(apply_transaction))
        .route("/v1/products", get(list_products))
        .route("/v1/products/:product_id/purchase", post(purchase))
        .route("/v1/quests", get(list_quests).post(create_quest))
        .route("/v1/quests/:quest_id", delete(delete_quest))
        .route("/v1/quests/:quest_id/accept", post(accept_quest))
        .route("/v1/quests/:quest_id/submissions", post(submit_quest))
        .route("/v1/submissions", get(list_submissions))
        .route("/v1/submissions/:submission_id/review", post(review_submission))
        .route("/v1/transactions", get(list_transactions))
        .route("/v1/audit/balances", get(audit_balances))
        .route("/v1/snapshot", get(export_snapshot).post(import_snapshot))
        .route("/v1/reset", post(reset))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("economy error: {0}")]
    Economy(#[from] EconomyError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Economy(#[from] EconomyError),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Http { status, message } => (status, message),
            ApiError::Economy(err) => {
                let status = match &err {
                    EconomyError::NotFound { .. } => StatusCode::NOT_FOUND,
                    EconomyError::InvalidRecord(_) | EconomyError::Integrity(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    EconomyError::Store(_)
                    | EconomyError::Serialization(_)
                    | EconomyError::LockPoisoned(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    store_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "classgold-service",
        store_backend: state.economy.store_label(),
    })
}

#[derive(Debug, Clone, Serialize)]
struct UserView {
    #[serde(flatten)]
    user: User,
    level: Level,
}

#[derive(Debug, Clone, Serialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

async fn list_users(
    State(state): State<ServiceState>,
) -> Result<Json<ItemsResponse<UserView>>, ApiError> {
    let items = state
        .economy
        .users()?
        .into_iter()
        .map(|user| UserView {
            level: user.level(),
            user,
        })
        .collect();
    Ok(Json(ItemsResponse { items }))
}

async fn user_progress(
    Path(user_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Json<ItemsResponse<QuestProgressView>>, ApiError> {
    Ok(Json(ItemsResponse {
        items: state.economy.quest_progress(&user_id)?,
    }))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest {
    amount: u64,
    #[serde(rename = "type")]
    kind: TransactionType,
    reason: String,
}

async fn apply_transaction(
    Path(user_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<TransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    if request.reason.trim().is_empty() {
        return Err(ApiError::bad_request("reason is required"));
    }
    let transaction = state.economy.apply_transaction(
        &user_id,
        request.amount,
        request.kind,
        request.reason,
    )?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

async fn list_products(
    State(state): State<ServiceState>,
) -> Result<Json<ItemsResponse<Product>>, ApiError> {
    Ok(Json(ItemsResponse {
        items: state.economy.products()?,
    }))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorRequest {
    user_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct PurchaseResponse {
    success: bool,
    #[serde(flatten)]
    outcome: PurchaseOutcome,
}

async fn purchase(
    Path(product_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let outcome = state.economy.try_purchase(&request.user_id, &product_id)?;
    Ok(Json(PurchaseResponse {
        success: outcome.is_success(),
        outcome,
    }))
}

async fn list_quests(
    State(state): State<ServiceState>,
) -> Result<Json<ItemsResponse<Quest>>, ApiError> {
    Ok(Json(ItemsResponse {
        items: state.economy.quests()?,
    }))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateQuestRequest {
    id: Option<String>,
    title: String,
    description: String,
    reward_gold: u64,
    max_assignees: u32,
    due_date: NaiveDate,
    created_by: String,
}

async fn create_quest(
    State(state): State<ServiceState>,
    Json(request): Json<CreateQuestRequest>,
) -> Result<(StatusCode, Json<Quest>), ApiError> {
    if request.title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    let mut quest = Quest::new(
        request.title,
        request.description,
        request.reward_gold,
        request.max_assignees,
        request.due_date,
        request.created_by,
    );
    if let Some(id) = request.id {
        quest = quest.with_id(id);
    }
    let quest = state.economy.create_quest(quest)?;
    Ok((StatusCode::CREATED, Json(quest)))
}

async fn delete_quest(
    Path(quest_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<StatusCode, ApiError> {
    if state.economy.delete_quest(&quest_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("quest '{quest_id}' not found")))
    }
}

#[derive(Debug, Clone, Serialize)]
struct AcceptResponse {
    success: bool,
    #[serde(flatten)]
    outcome: AcceptOutcome,
}

async fn accept_quest(
    Path(quest_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<AcceptResponse>, ApiError> {
    let outcome = state.economy.try_accept(&quest_id, &request.user_id)?;
    Ok(Json(AcceptResponse {
        success: outcome.is_success(),
        outcome,
    }))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    user_id: String,
    student_name: String,
    content: String,
    evidence_link: Option<String>,
}

async fn submit_quest(
    Path(quest_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitOutcome>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }
    let mut draft = SubmissionDraft::new(
        quest_id,
        request.user_id,
        request.student_name,
        request.content,
    );
    draft.evidence_link = request.evidence_link;
    Ok(Json(state.economy.submit_draft(draft)?))
}

#[derive(Debug, Clone, Deserialize)]
struct SubmissionsQuery {
    quest_id: Option<String>,
    student_id: Option<String>,
    status: Option<String>,
}

fn parse_status_filter(status: Option<&str>) -> Result<Option<SubmissionStatus>, ApiError> {
    match status.map(|value| value.to_ascii_uppercase()) {
        None => Ok(None),
        Some(value) if value == "PENDING" => Ok(Some(SubmissionStatus::Pending)),
        Some(value) if value == "APPROVED" => Ok(Some(SubmissionStatus::Approved)),
        Some(value) if value == "REJECTED" => Ok(Some(SubmissionStatus::Rejected)),
        Some(other) => Err(ApiError::bad_request(format!(
            "invalid status '{}'; expected one of: PENDING, APPROVED, REJECTED",
            other
        ))),
    }
}

async fn list_submissions(
    State(state): State<ServiceState>,
    Query(query): Query<SubmissionsQuery>,
) -> Result<Json<ItemsResponse<QuestSubmission>>, ApiError> {
    let status_filter = parse_status_filter(query.status.as_deref())?;
    let mut items = state.economy.submissions()?;

    if let Some(quest_id) = query.quest_id.as_deref() {
        items.retain(|submission| submission.quest_id == quest_id);
    }
    if let Some(student_id) = query.student_id.as_deref() {
        items.retain(|submission| submission.student_id == student_id);
    }
    if let Some(status) = status_filter {
        items.retain(|submission| submission.status == status);
    }

    Ok(Json(ItemsResponse { items }))
}

#[derive(Debug, Clone, Deserialize)]
struct ReviewRequest {
    approved: bool,
    #[serde(default)]
    feedback: String,
}

async fn review_submission(
    Path(submission_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ReviewOutcome>, ApiError> {
    Ok(Json(state.economy.review(
        &submission_id,
        request.approved,
        request.feedback,
    )?))
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionsQuery {
    user_id: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct TransactionsResponse {
    total: usize,
    returned: usize,
    items: Vec<Transaction>,
}

async fn list_transactions(
    State(state): State<ServiceState>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let mut transactions = state.economy.transactions()?;
    if let Some(user_id) = query.user_id.as_deref() {
        transactions.retain(|transaction| transaction.user_id == user_id);
    }

    let total = transactions.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);
    let items = transactions
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect::<Vec<_>>();

    Ok(Json(TransactionsResponse {
        total,
        returned: items.len(),
        items,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct AuditResponse {
    consistent: bool,
    drifts: Vec<BalanceDrift>,
}

async fn audit_balances(
    State(state): State<ServiceState>,
) -> Result<Json<AuditResponse>, ApiError> {
    let drifts = state.economy.audit_balances()?;
    Ok(Json(AuditResponse {
        consistent: drifts.is_empty(),
        drifts,
    }))
}

async fn export_snapshot(
    State(state): State<ServiceState>,
) -> Result<Json<EconomySnapshot>, ApiError> {
    Ok(Json(state.economy.export_snapshot()?))
}

async fn import_snapshot(
    State(state): State<ServiceState>,
    Json(snapshot): Json<EconomySnapshot>,
) -> Result<StatusCode, ApiError> {
    state.economy.import_snapshot(snapshot)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset(State(state): State<ServiceState>) -> Result<StatusCode, ApiError> {
    state.economy.reset()?;
    Ok(StatusCode::NO_CONTENT)
}
