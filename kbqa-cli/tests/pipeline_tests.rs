//! Answer generation and the full question pipeline against a fake Ollama.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use kbqa_cli::{
    AnswerGenerator, AppConfig, GenerationConfig, NO_ANSWER, NO_CONTEXT, QaPipeline,
    SERVICE_UNAVAILABLE,
};
use kbqa_retrieval::{EmbeddingBackend, IndexStatus};
use serde_json::{Value, json};

const QA_MODEL: &str = "qa-model";
const EMBED_MODEL: &str = "embed-model";

#[derive(Clone, Default)]
struct Fake {
    generate_requests: Arc<Mutex<Vec<Value>>>,
}

/// Embeds by counting the words "cat" and "dog".
async fn embeddings(Json(body): Json<Value>) -> Response {
    if body["model"] != EMBED_MODEL {
        return StatusCode::NOT_FOUND.into_response();
    }
    let prompt = body["prompt"].as_str().unwrap_or_default().to_lowercase();
    let cats = prompt.matches("cat").count() as f32;
    let dogs = prompt.matches("dog").count() as f32;
    Json(json!({ "embedding": [cats, dogs, 1.0] })).into_response()
}

/// Echoes the prompt back, except for a few magic questions.
async fn generate(State(fake): State<Fake>, Json(body): Json<Value>) -> Response {
    fake.generate_requests.lock().unwrap().push(body.clone());
    if body["model"] != QA_MODEL {
        return StatusCode::NOT_FOUND.into_response();
    }
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    if prompt.contains("Question: crash") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    if prompt.contains("Question: silent") {
        return Json(json!({ "done": true })).into_response();
    }
    Json(json!({ "response": prompt, "done": true })).into_response()
}

async fn spawn_fake() -> (SocketAddr, Fake) {
    let fake = Fake::default();
    let app = Router::new()
        .route("/api/embeddings", post(embeddings))
        .route("/api/generate", post(generate))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, fake)
}

fn generation(addr: SocketAddr) -> GenerationConfig {
    GenerationConfig { base_url: format!("http://{addr}/"), model: QA_MODEL.into(), timeout_secs: 5 }
}

fn app_config(addr: SocketAddr, dir: &Path, files: Vec<std::path::PathBuf>) -> AppConfig {
    let mut config = AppConfig::default();
    config.documents.file_paths = files;
    config.documents.chunk_size = 40;
    config.documents.chunk_overlap = 0;
    config.retrieval.embedding_backend = EmbeddingBackend::Remote;
    config.retrieval.ollama_base_url = format!("http://{addr}");
    config.retrieval.remote_embedding_model = EMBED_MODEL.into();
    config.retrieval.embedding_dimension = Some(3);
    config.retrieval.use_reranker = false;
    config.retrieval.top_k = 1;
    config.retrieval.index_path = dir.join("vector_db").join("index.bin");
    config.generation = generation(addr);
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generator_sends_non_streaming_request() {
    let (addr, fake) = spawn_fake().await;
    let generator = AnswerGenerator::new(&generation(addr)).unwrap();
    assert_eq!(generator.model(), QA_MODEL);

    let answer = generator.generate("where?", "in the box").await;

    assert!(answer.contains("in the box"));
    let requests = fake.generate_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["model"], QA_MODEL);
    assert_eq!(requests[0]["stream"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_response_field_gives_fixed_answer() {
    let (addr, _) = spawn_fake().await;
    let generator = AnswerGenerator::new(&generation(addr)).unwrap();
    assert_eq!(generator.generate("silent", "ctx").await, NO_ANSWER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_error_gives_unavailable_answer() {
    let (addr, _) = spawn_fake().await;
    let generator = AnswerGenerator::new(&generation(addr)).unwrap();
    assert_eq!(generator.generate("crash", "ctx").await, SERVICE_UNAVAILABLE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_model_gives_unavailable_answer() {
    let config = GenerationConfig {
        base_url: "http://127.0.0.1:1".into(),
        ..GenerationConfig::default()
    };
    let generator = AnswerGenerator::new(&config).unwrap();
    assert_eq!(generator.generate("anything", "ctx").await, SERVICE_UNAVAILABLE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn question_is_answered_from_the_closest_passage() {
    let (addr, fake) = spawn_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("pets.txt");
    std::fs::write(&doc, "The dog sleeps in the yard.\n\nThe cat naps on the cat tree.").unwrap();
    let config = app_config(addr, dir.path(), vec![doc]);

    let mut pipeline = QaPipeline::from_config(&config).unwrap();
    let status = pipeline.setup(false).await;
    assert!(matches!(status, IndexStatus::Built { chunks: 2, .. }));
    assert!(pipeline.retriever().is_ready());
    assert_eq!(pipeline.retriever().index().map(|index| index.dimension()), Some(3));

    let answer = pipeline.ask("where does the cat nap? cat").await;

    assert!(answer.contains("The cat naps on the cat tree."));
    assert!(!answer.contains("yard"));
    assert_eq!(fake.generate_requests.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_setup_reuses_the_saved_index() {
    let (addr, _) = spawn_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("pets.txt");
    std::fs::write(&doc, "The dog sleeps in the yard.").unwrap();
    let config = app_config(addr, dir.path(), vec![doc]);

    let mut first = QaPipeline::from_config(&config).unwrap();
    assert!(matches!(first.setup(false).await, IndexStatus::Built { .. }));

    let mut second = QaPipeline::from_config(&config).unwrap();
    assert_eq!(second.setup(false).await, IndexStatus::Loaded { chunks: 1, dimension: 3 });
    assert!(matches!(second.setup(true).await, IndexStatus::Built { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_documents_means_no_context_answer() {
    let (addr, fake) = spawn_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let config = app_config(addr, dir.path(), vec![dir.path().join("missing.txt")]);

    let mut pipeline = QaPipeline::from_config(&config).unwrap();
    assert!(!pipeline.setup(false).await.is_ready());
    assert!(!pipeline.retriever().is_ready());

    assert_eq!(pipeline.ask("anything?").await, NO_CONTEXT);
    assert!(fake.generate_requests.lock().unwrap().is_empty());
}
