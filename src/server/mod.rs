//! HTTP 서버 - /ask, /health 라우트
//!
//! 얇은 경계 계층입니다. 검색 실패만 500으로 나가고,
//! 생성 경로 실패는 항상 답변 문자열로 열화되어 200을 유지합니다.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::context::{format_fragment, truncate_chars};
use crate::embedding::{get_api_key, GeminiEmbedding, DEFAULT_DIMENSION};
use crate::generator::Generator;
use crate::retrieval::{
    Bm25Index, DenseIndex, FlatVectorIndex, HybridRetriever, LexicalIndex, MetaStore,
};

// ============================================================================
// Schemas
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub context: Vec<String>,
    pub latency_sec: f64,
}

// ============================================================================
// Errors
// ============================================================================

/// /ask의 유일한 하드 실패: 검색 계층 오류
#[derive(Debug, Error)]
pub enum AskError {
    #[error("ask_failed: {0:#}")]
    Retrieval(#[from] anyhow::Error),
}

impl IntoResponse for AskError {
    fn into_response(self) -> Response {
        tracing::error!("{self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

// ============================================================================
// State & Router
// ============================================================================

/// 요청 간 공유되는 읽기 전용 상태
pub struct AppState {
    pub retriever: HybridRetriever,
    pub generator: Generator,
    pub settings: Settings,
}

/// 라우터 생성
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AskError> {
    let t0 = Instant::now();

    let records = state
        .retriever
        .search(&req.question, state.settings.top_k)
        .await?;

    let context_full: Vec<String> = records
        .iter()
        .map(|r| format_fragment(r, state.settings.max_fragment_chars))
        .collect();

    let answer = state.generator.ask(&req.question, &context_full).await;

    let context_short: Vec<String> = context_full
        .iter()
        .map(|c| truncate_chars(c, state.settings.max_context_chars))
        .collect();

    let latency_sec = (t0.elapsed().as_secs_f64() * 100.0).round() / 100.0;
    tracing::info!(
        question_chars = req.question.chars().count(),
        context_count = context_short.len(),
        latency_sec,
        "answered /ask"
    );

    Ok(Json(AskResponse {
        answer,
        context: context_short,
        latency_sec,
    }))
}

// ============================================================================
// Startup
// ============================================================================

/// 덴스 아티팩트 로드 + 행렬 차원에 맞춘 임베더 구성
///
/// 임베더 차원이 행렬과 다르면 모든 검색이 요청 시점에 실패하므로,
/// 차원은 행렬에서 읽어 임베더에 주입합니다. 행렬 차원이 임베딩
/// API가 지원하지 않는 값이면 여기서 시작 오류가 납니다.
fn load_dense_index(path: &Path, api_key: String) -> Result<FlatVectorIndex> {
    let vectors = FlatVectorIndex::load_matrix(path)?;
    let dimension = vectors.first().map(Vec::len).unwrap_or(DEFAULT_DIMENSION);
    let embedder = Arc::new(GeminiEmbedding::with_dimension(api_key, dimension)?);
    FlatVectorIndex::from_vectors(vectors, embedder)
}

/// 아티팩트 로드 후 서버 실행
pub async fn run(settings: Settings) -> Result<()> {
    let api_key = get_api_key().context("Failed to create embedder")?;

    let meta = MetaStore::load(&settings.meta_path).context("Failed to load meta artifact")?;
    let dense = load_dense_index(&settings.index_path, api_key)
        .context("Failed to load vector artifact")?;
    let lexical = Bm25Index::load(&settings.bm25_path).context("Failed to load BM25 artifact")?;

    // 세 아티팩트는 동일 인덱서 실행의 산출물이어야 함
    if meta.len() != dense.len() || meta.len() != lexical.len() {
        bail!(
            "Artifact size mismatch: meta={}, dense={}, bm25={}",
            meta.len(),
            dense.len(),
            lexical.len()
        );
    }

    tracing::info!(records = meta.len(), "knowledge base loaded");

    let retriever = HybridRetriever::new(
        meta,
        Arc::new(dense),
        Arc::new(lexical),
        settings.hybrid_alpha,
        settings.faiss_k,
    );
    let generator = Generator::from_settings(&settings)?;

    let bind_addr = settings.bind_addr.clone();
    let state = Arc::new(AppState {
        retriever,
        generator,
        settings,
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .await
        .context("Server error")?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::{FailingEmbedder, StubEmbedder};
    use crate::embedding::EmbeddingProvider;
    use crate::generator::{GenApiClient, RetryPolicy};
    use crate::retrieval::Record;
    use axum::routing::post as axum_post;
    use regex::Regex;
    use std::io::Write;
    use std::time::Duration;

    /// 고정 "Я не знаю." 응답 목 GenAPI (폴백 경로 강제)
    async fn mock_genapi_unknown() -> String {
        let app = Router::new().route(
            "/",
            axum_post(|| async { Json(json!({"output": "Я не знаю."})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn test_records() -> Vec<Record> {
        vec![
            Record::new(
                "Как вернуть товар?",
                "Оформите возврат в личном кабинете в течение 14 дней",
            ),
            Record::new(
                "Как обменять товар?",
                "Обмен (exchange) возможен в течение 30 дней при сохранении чека",
            ),
            Record::new(
                "Заказ не пришёл, что делать?",
                "Свяжитесь с поддержкой и укажите номер заказа",
            ),
        ]
    }

    /// 실제 파이프라인과 동일하게 조립된 테스트 상태
    async fn test_state(genapi_url: String) -> Arc<AppState> {
        let records = test_records();
        let embedder = Arc::new(StubEmbedder::new(8));

        // 인덱서가 하듯 "Вопрос:\nОтвет:" 코퍼스 구성 후 임베딩
        let corpus: Vec<String> = records
            .iter()
            .map(|r| format!("Вопрос: {}\nОтвет: {}", r.question_ru, r.answer_ru))
            .collect();
        let mut vectors = Vec::new();
        for doc in &corpus {
            vectors.push(embedder.embed(doc).await.unwrap());
        }

        let mut settings = Settings::default();
        settings.genapi_url = genapi_url;
        settings.genapi_key = Some("test-key".to_string());

        let retriever = HybridRetriever::new(
            MetaStore::from_records(records),
            Arc::new(FlatVectorIndex::from_vectors(vectors, embedder).unwrap()),
            Arc::new(Bm25Index::from_corpus(&corpus)),
            settings.hybrid_alpha,
            settings.faiss_k,
        );

        let client = GenApiClient::new(
            settings.genapi_url.clone(),
            settings.genapi_key.clone(),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            multiplier: 2.0,
        });
        let generator = Generator::new(
            client,
            settings.max_context_chars,
            settings.max_fragment_chars,
        );

        Arc::new(AppState {
            retriever,
            generator,
            settings,
        })
    }

    /// 라우터를 임시 포트로 띄우고 베이스 URL 반환
    async fn serve(state: Arc<AppState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn assert_no_bracket_refs(answer: &str) {
        let re = Regex::new(r"\[\s*\d+(\s*,\s*\d+)*\s*\]").unwrap();
        assert!(!re.is_match(answer), "answer contains [n]: {answer:?}");
    }

    #[test]
    fn test_startup_embedder_follows_artifact_dimension() {
        // 768이 아닌 아티팩트도 임베더 차원이 행렬을 따라가야
        // 요청 시점 차원 불일치가 생기지 않음
        let row = vec![0.5f32; 1536];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let matrix = serde_json::to_string(&vec![row.clone(), row]).unwrap();
        file.write_all(matrix.as_bytes()).unwrap();

        let index = load_dense_index(file.path(), "test-key".to_string()).unwrap();
        assert_eq!(index.dimension(), 1536);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_startup_rejects_unsupported_artifact_dimension() {
        // 임베딩 API가 못 만드는 차원은 요청마다 실패하는 대신 시작 오류
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[[0.1, 0.2, 0.3, 0.4]]").unwrap();
        assert!(load_dense_index(file.path(), "test-key".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let genapi = mock_genapi_unknown().await;
        let base = serve(test_state(genapi).await).await;

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ask_unknown_question_returns_fixed_phrase() {
        let genapi = mock_genapi_unknown().await;
        let base = serve(test_state(genapi).await).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/ask"))
            .json(&json!({"question": "Как готовить борщ?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let body: AskResponse = resp.json().await.unwrap();
        assert_eq!(body.answer, "Я не знаю.");
        assert!(body.latency_sec >= 0.0);
    }

    #[tokio::test]
    async fn test_ask_refund_question_composes_policy_answer() {
        let genapi = mock_genapi_unknown().await;
        let base = serve(test_state(genapi).await).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/ask"))
            .json(&json!({"question": "Как оформить возврат средств?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let body: AskResponse = resp.json().await.unwrap();
        assert!(
            body.answer
                .to_lowercase()
                .contains("возврат средств происходит по правилам возврата товара"),
            "unexpected answer: {:?}",
            body.answer
        );
        assert_no_bracket_refs(&body.answer);
        assert!(!body.context.is_empty());
    }

    #[tokio::test]
    async fn test_ask_exchange_question_in_english() {
        let genapi = mock_genapi_unknown().await;
        let base = serve(test_state(genapi).await).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/ask"))
            .json(&json!({"question": "How to exchange item?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let body: AskResponse = resp.json().await.unwrap();
        let lower = body.answer.to_lowercase();
        assert!(
            lower.contains("обмен") || lower.contains("exchange"),
            "unexpected answer: {:?}",
            body.answer
        );
        assert_no_bracket_refs(&body.answer);
    }

    #[tokio::test]
    async fn test_ask_retrieval_failure_returns_500() {
        let genapi = mock_genapi_unknown().await;
        let state = test_state(genapi).await;

        // 임베더가 죽은 상태를 재현
        let records = test_records();
        let corpus: Vec<String> = records
            .iter()
            .map(|r| format!("Вопрос: {}\nОтвет: {}", r.question_ru, r.answer_ru))
            .collect();
        let broken = Arc::new(AppState {
            retriever: HybridRetriever::new(
                MetaStore::from_records(records),
                Arc::new(
                    FlatVectorIndex::from_vectors(
                        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
                        Arc::new(FailingEmbedder),
                    )
                    .unwrap(),
                ),
                Arc::new(Bm25Index::from_corpus(&corpus)),
                0.6,
                50,
            ),
            generator: Generator::new(
                GenApiClient::new(
                    state.settings.genapi_url.clone(),
                    state.settings.genapi_key.clone(),
                    Duration::from_secs(5),
                )
                .unwrap(),
                600,
                800,
            ),
            settings: state.settings.clone(),
        });
        let base = serve(broken).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/ask"))
            .json(&json!({"question": "Как вернуть товар?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 500);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("ask_failed:"));
    }

    #[tokio::test]
    async fn test_ask_context_entries_are_capped() {
        let genapi = mock_genapi_unknown().await;
        let base = serve(test_state(genapi).await).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/ask"))
            .json(&json!({"question": "Как вернуть товар?"}))
            .send()
            .await
            .unwrap();
        let body: AskResponse = resp.json().await.unwrap();

        // max_context_chars + 말줄임표 여유
        for fragment in &body.context {
            assert!(fragment.chars().count() <= 601);
        }
    }
}
