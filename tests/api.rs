//! End-to-end tests for the HTTP API.
//!
//! Each test serves the real router on a free local port with a
//! deterministic embedder and a counting chat model in place of the hosted
//! providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use ragchat::config::Config;
use ragchat::server::{build_router, AppState};
use ragchat::vector_store::SqliteVectorStore;
use ragchat::{db, migrate, submissions, users};
use ragchat_core::compose::{ChatModel, FALLBACK_ANSWER};
use ragchat_core::embedding::Embedder;

// ─── Fakes ──────────────────────────────────────────────────────────

const DIMS: usize = 64;

/// Bag-of-words vectors: each lowercase word bumps one hashed bucket.
struct WordHashEmbedder;

fn bucket(word: &str) -> usize {
    word.bytes()
        .fold(5381usize, |h, b| h.wrapping_mul(33) ^ b as usize)
        % DIMS
}

#[async_trait]
impl Embedder for WordHashEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                    v[bucket(&word.to_lowercase())] += 1.0;
                }
                v
            })
            .collect())
    }
}

#[derive(Default)]
struct CountingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for CountingModel {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("executor") {
            Ok("An executor carries out the will.".to_string())
        } else {
            Ok("Answered from context.".to_string())
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

struct TestServer {
    _tmp: TempDir,
    base: String,
    state: AppState,
    model: Arc<CountingModel>,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get_authed(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn upload(&self, filename: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(self.url("/documents/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal(tmp.path().join("app.sqlite"));
    config.auth.secret_key = "integration-test-secret".to_string();
    config.chunking.chunk_size = 200;
    config.chunking.chunk_overlap = 20;

    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    let store = SqliteVectorStore::open(&config).await.unwrap();
    let model = Arc::new(CountingModel::default());

    let state = AppState::new(
        config,
        pool,
        Arc::new(WordHashEmbedder),
        Arc::new(store),
        model.clone(),
    );
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let server = TestServer {
        _tmp: tmp,
        base: format!("http://{}", addr),
        state,
        model,
        client: reqwest::Client::new(),
    };
    wait_for_server(&server).await;
    server
}

async fn wait_for_server(server: &TestServer) {
    for _ in 0..50 {
        if let Ok(resp) = server.client.get(server.url("/health")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Server did not become ready within 5 seconds");
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_root_and_health() {
    let server = start_server().await;

    let resp = server.client.get(format!("{}/", server.base)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "running");
    assert_eq!(body["name"], "Toolboxx Chat Bot");

    let (status, health) = server.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["vectorstore_documents"], 0);
    assert!(health["version"].is_string());
}

#[tokio::test]
async fn test_chat_on_empty_index_returns_fallback_without_model_call() {
    let server = start_server().await;

    let (status, body) = server
        .post_json("/chat", json!({ "message": "What is a living will?" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], FALLBACK_ANSWER);
    assert_eq!(body["sources"], json!([]));
    assert_eq!(server.model.calls.load(Ordering::SeqCst), 0);

    let id = body["conversation_id"].as_i64().unwrap();
    let (status, messages) = server.get_json(&format!("/chat/{}/messages", id)).await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "What is a living will?");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], FALLBACK_ANSWER);
}

#[tokio::test]
async fn test_chat_rejects_empty_message_and_unknown_conversation() {
    let server = start_server().await;

    let (status, body) = server.post_json("/chat", json!({ "message": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server
        .post_json("/chat", json!({ "message": "hello", "conversation_id": 4242 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (_, list) = server.get_json("/conversations").await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn test_upload_index_search_and_grounded_chat() {
    let server = start_server().await;

    let (status, body) = server
        .upload(
            "wills.txt",
            b"An executor is the person named in a will to carry out its instructions.",
        )
        .await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", body);
    assert_eq!(body["filename"], "wills.txt");
    assert_eq!(body["status"], "uploaded");

    let trust = b"A trust holds assets for beneficiaries.";
    let (status, body) = server.upload("trusts.txt", trust).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "trusts.txt");

    let (status, _) = server.upload("notes.exe", b"nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, docs) = server.get_json("/documents").await;
    assert!(docs
        .as_array()
        .unwrap()
        .iter()
        .all(|d| d["status"] == "pending"));

    let (status, report) = server.post_json("/documents/index", json!({})).await;
    assert_eq!(status, StatusCode::OK, "index failed: {}", report);
    assert_eq!(report["status"], "completed");
    assert_eq!(report["documents_loaded"], 2);
    assert_eq!(report["chunks_created"], 2);
    assert_eq!(report["vectorstore_count"], 2);

    let (_, docs) = server.get_json("/documents").await;
    let docs = docs.as_array().unwrap();
    assert_eq!(docs.len(), 2);
    for doc in docs {
        assert_eq!(doc["status"], "indexed");
        assert_eq!(doc["chunks_created"], 1);
        assert!(doc["indexed_at"].is_string());
    }

    // Indexing again adds no duplicate vectors.
    let (_, report) = server.post_json("/documents/index", json!({})).await;
    assert_eq!(report["vectorstore_count"], 2);

    let (status, results) = server.get_json("/search?query=who%20is%20the%20executor&k=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["query"], "who is the executor");
    let results = results["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["source"], "wills.txt");
    assert!(results[0]["score"].as_f64().unwrap() > 0.0);

    let (status, body) = server
        .post_json("/chat", json!({ "message": "Who is the executor of a will?" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "An executor carries out the will.");
    assert!(!body["sources"].as_array().unwrap().is_empty());
    assert_eq!(server.model.calls.load(Ordering::SeqCst), 1);

    let (_, health) = server.get_json("/health").await;
    assert_eq!(health["vectorstore_documents"], 2);
}

#[tokio::test]
async fn test_upload_without_file_field_is_rejected() {
    let server = start_server().await;
    let form = reqwest::multipart::Form::new().text("other", "value");
    let resp = server
        .client
        .post(server.url("/documents/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_conversation_crud_and_cascade() {
    let server = start_server().await;

    let (status, conv) = server.post_json("/conversations", json!({ "title": "Probate" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conv["title"], "Probate");
    assert_eq!(conv["message_count"], 0);

    let (_, untitled) = server.post_json("/conversations", json!({})).await;
    assert_eq!(untitled["title"], "New Conversation");

    let id = conv["id"].as_i64().unwrap();
    let (status, _) = server
        .post_json("/chat", json!({ "message": "hi", "conversation_id": id }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = server.get_json("/conversations?skip=0&limit=1").await;
    assert_eq!(list["total"], 2);
    assert_eq!(list["conversations"].as_array().unwrap().len(), 1);

    let (_, list) = server.get_json("/conversations").await;
    let probate = list["conversations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == id)
        .unwrap()
        .clone();
    assert_eq!(probate["message_count"], 2);

    let resp = server
        .client
        .delete(server.url(&format!("/conversations/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&server.state.pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);

    let (status, _) = server.get_json(&format!("/chat/{}/messages", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let resp = server
        .client
        .delete(server.url(&format!("/conversations/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_login_me() {
    let server = start_server().await;
    let creds = json!({ "email": "Jane@Example.com", "password": "s3cret" });

    let (status, body) = server.post_json("/auth/register", creds.clone()).await;
    assert_eq!(status, StatusCode::OK, "register failed: {}", body);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["email"], "jane@example.com");
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = server.post_json("/auth/register", creds.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, _) = server
        .post_json("/auth/login", json!({ "email": "jane@example.com", "password": "wrong" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server.post_json("/auth/login", creds.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, me) = server.get_authed("/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "jane@example.com");

    let resp = server.client.get(server.url("/auth/me")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["www-authenticate"], "Bearer");

    let (status, _) = server.get_authed("/auth/me", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server.post_json("/auth/logout", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully logged out");
}

#[tokio::test]
async fn test_disabled_user_cannot_log_in() {
    let server = start_server().await;
    let creds = json!({ "email": "sam@example.com", "password": "password" });
    let (_, body) = server.post_json("/auth/register", creds.clone()).await;
    let user_id = body["user"]["id"].as_i64().unwrap();

    users::set_active(&server.state.pool, user_id, false).await.unwrap();

    let (status, body) = server.post_json("/auth/login", creds).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "User account is disabled");
}

#[tokio::test]
async fn test_submissions_are_scoped_to_caller() {
    let server = start_server().await;
    submissions::seed(&server.state.pool, false).await.unwrap();

    let login = |email: &str| json!({ "email": email, "password": submissions::SEED_PASSWORD });
    let (status, john) = server.post_json("/auth/login", login("john.doe@example.com")).await;
    assert_eq!(status, StatusCode::OK);
    let john_token = john["access_token"].as_str().unwrap().to_string();
    let (_, jane) = server.post_json("/auth/login", login("jane.smith@example.com")).await;
    let jane_token = jane["access_token"].as_str().unwrap().to_string();

    let (status, subs) = server.get_authed("/submissions", &john_token).await;
    assert_eq!(status, StatusCode::OK);
    let subs = subs.as_array().unwrap();
    assert_eq!(subs.len(), 3);
    let john_sub = subs[0]["id"].as_i64().unwrap();

    let (status, one) = server
        .get_authed(&format!("/submissions/{}", john_sub), &john_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["id"], john_sub);

    let (status, _) = server
        .get_authed(&format!("/submissions/{}", john_sub), &jane_token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let resp = server.client.get(server.url("/submissions")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
