//! HTTP API.
//!
//! Every route below is nested under `/api/v1`; `GET /` sits at the root.
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/auth/register` | | Create a user, return a token |
//! | `POST` | `/auth/login` | | Exchange credentials for a token |
//! | `POST` | `/auth/logout` | | Stateless; the client drops its token |
//! | `GET` | `/auth/me` | bearer | The current user |
//! | `POST` | `/chat` | | Ask a question |
//! | `GET` | `/chat/{id}/messages` | | A conversation's messages in order |
//! | `POST` | `/documents/upload` | | Multipart upload (field `file`) |
//! | `POST` | `/documents/index` | | Index the documents directory |
//! | `GET` | `/documents` | | Uploaded documents and their status |
//! | `POST` | `/conversations` | | Create an empty conversation |
//! | `GET` | `/conversations` | | Page through conversations |
//! | `DELETE` | `/conversations/{id}` | | Delete a conversation and its messages |
//! | `GET` | `/submissions` | bearer | The caller's submissions |
//! | `GET` | `/submissions/{id}` | bearer | One of the caller's submissions |
//! | `GET` | `/search` | | Raw similarity search |
//! | `GET` | `/health` | | Status and vector count |
//!
//! Errors use the body described in [`crate::error`].

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ragchat_core::compose::{AnswerComposer, ChatModel};
use ragchat_core::embedding::Embedder;
use ragchat_core::retriever::Retriever;
use ragchat_core::store::VectorStore;

use crate::auth::{self, CurrentUser, Credentials, TokenResponse};
use crate::chat::{ChatRequest, ChatResponse, ChatService};
use crate::config::Config;
use crate::conversations;
use crate::documents;
use crate::embedding::create_embedder;
use crate::error::{ApiError, ApiResult};
use crate::ingest::{self, IndexReport};
use crate::llm::create_chat_model;
use crate::loader::supported_file_type;
use crate::models::{Conversation, DocumentRecord, Message, Submission, User};
use crate::submissions;
use crate::vector_store::SqliteVectorStore;
use crate::{db, migrate};

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub retriever: Arc<Retriever>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    /// Assemble state from already-built parts.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let retriever = Arc::new(Retriever::new(
            embedder,
            store,
            config.vectors.collection.clone(),
        ));
        let composer = Arc::new(AnswerComposer::new(
            retriever.clone(),
            model,
            config.retrieval.k,
        ));
        let chat = Arc::new(ChatService::new(pool.clone(), composer));
        Self {
            config: Arc::new(config),
            pool,
            retriever,
            chat,
        }
    }

    /// Open both databases, run migrations, and build the configured providers.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        migrate::run_migrations(config).await?;
        let pool = db::connect(config).await?;
        let store = SqliteVectorStore::open(config).await?;
        let embedder = create_embedder(&config.embedding)?;
        let model = create_chat_model(&config.llm)?;
        Ok(Self::new(
            config.clone(),
            pool,
            embedder,
            Arc::new(store),
            model,
        ))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    let api = Router::new()
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/logout", post(handle_logout))
        .route("/auth/me", get(handle_me))
        .route("/chat", post(handle_chat))
        .route("/chat/{id}/messages", get(handle_messages))
        .route(
            "/documents/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/documents/index", post(handle_index))
        .route("/documents", get(handle_list_documents))
        .route(
            "/conversations",
            post(handle_create_conversation).get(handle_list_conversations),
        )
        .route("/conversations/{id}", delete(handle_delete_conversation))
        .route("/submissions", get(handle_list_submissions))
        .route("/submissions/{id}", get(handle_get_submission))
        .route("/search", get(handle_search))
        .route("/health", get(handle_health));

    Router::new()
        .route("/", get(handle_root))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Bind to `[server].bind` and serve until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        name = %config.app.name,
        "server listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ root and health ============

#[derive(Serialize)]
struct RootResponse {
    name: String,
    version: &'static str,
    status: &'static str,
}

async fn handle_root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        name: state.config.app.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    vectorstore_documents: usize,
}

async fn handle_health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        vectorstore_documents: state.retriever.count().await?,
    }))
}

// ============ auth ============

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(
        auth::register(&state.pool, &state.config.auth, creds).await?,
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(
        auth::login(&state.pool, &state.config.auth, creds).await?,
    ))
}

async fn handle_logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Successfully logged out",
    })
}

async fn handle_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

// ============ chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    Ok(Json(state.chat.chat(request).await?))
}

async fn handle_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Message>>> {
    if !conversations::exists(&state.pool, id).await? {
        return Err(ApiError::not_found("Conversation not found"));
    }
    Ok(Json(conversations::messages(&state.pool, id).await?))
}

// ============ documents ============

#[derive(Serialize)]
struct UploadResponse {
    id: i64,
    filename: String,
    status: &'static str,
    chunks_created: i64,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .and_then(documents::sanitize_filename)
            .ok_or_else(|| ApiError::bad_request("Upload must have a filename"))?;
        if supported_file_type(std::path::Path::new(&filename)).is_none() {
            return Err(ApiError::bad_request(format!(
                "Unsupported file type: {}",
                filename
            )));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        let record =
            documents::save_upload(&state.pool, &state.config.documents.path, &filename, &bytes)
                .await?;

        return Ok(Json(UploadResponse {
            id: record.id,
            filename: record.filename,
            status: "uploaded",
            chunks_created: 0,
        }));
    }

    Err(ApiError::bad_request("Missing multipart field: file"))
}

async fn handle_index(State(state): State<AppState>) -> ApiResult<Json<IndexReport>> {
    let report = ingest::index_documents(&state.pool, &state.config, &state.retriever).await?;
    Ok(Json(report))
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DocumentRecord>>> {
    Ok(Json(documents::list(&state.pool).await?))
}

// ============ conversations ============

#[derive(Debug, Deserialize)]
struct CreateConversation {
    #[serde(default)]
    title: Option<String>,
}

async fn handle_create_conversation(
    State(state): State<AppState>,
    body: Option<Json<CreateConversation>>,
) -> ApiResult<Json<Conversation>> {
    let title = body.and_then(|Json(b)| b.title);
    Ok(Json(
        conversations::create(&state.pool, title.as_deref()).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ConversationList {
    conversations: Vec<Conversation>,
    total: i64,
}

async fn handle_list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ConversationList>> {
    let (conversations, total) = conversations::list(
        &state.pool,
        params.skip.unwrap_or(0),
        params.limit.unwrap_or(conversations::DEFAULT_LIST_LIMIT),
    )
    .await?;
    Ok(Json(ConversationList {
        conversations,
        total,
    }))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn handle_delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StatusResponse>> {
    if !conversations::delete(&state.pool, id).await? {
        return Err(ApiError::not_found("Conversation not found"));
    }
    tracing::info!(conversation_id = id, "conversation deleted");
    Ok(Json(StatusResponse { status: "deleted" }))
}

// ============ submissions ============

async fn handle_list_submissions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Submission>>> {
    Ok(Json(submissions::list_for_user(&state.pool, user.id).await?))
}

async fn handle_get_submission(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Submission>> {
    submissions::get_for_user(&state.pool, user.id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Submission not found"))
}

// ============ search ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResult {
    content: String,
    source: String,
    score: f32,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    if params.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let k = params.k.unwrap_or(state.config.retrieval.k);
    let hits = state
        .retriever
        .similarity_search(&params.query, k)
        .await
        .map_err(ApiError::Upstream)?;

    let results = hits
        .into_iter()
        .map(|hit| SearchResult {
            source: hit.chunk.source().to_string(),
            content: hit.chunk.text,
            score: hit.score,
        })
        .collect();
    Ok(Json(SearchResponse {
        query: params.query,
        results,
    }))
}
