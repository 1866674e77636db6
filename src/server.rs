//! HTTP boundary: `POST /run` and `GET /read`.
//!
//! Each request is handled independently with no shared mutable state.
//! `/run` feeds the task through classify → dispatch and maps every
//! pipeline failure to a 400 with a detail string; `/read` serves raw file
//! contents with a distinct 404 for missing paths.

use crate::classify::Classifier;
use crate::config::Config;
use crate::dispatch::{self, RunContext};
use crate::embeddings::{DisabledEmbeddingProvider, EmbeddingProvider, RemoteEmbeddingProvider};
use crate::ops::SidecarCardStore;
use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

/// Everything a request handler needs.  Immutable after startup.
pub struct AppState {
    pub classifier: Classifier,
    pub ctx: RunContext,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let classifier = Classifier::new(config)?;

        let embeddings: Arc<dyn EmbeddingProvider> = match RemoteEmbeddingProvider::new(config) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                eprintln!("[server] embeddings disabled: {e:#}");
                Arc::new(DisabledEmbeddingProvider)
            }
        };

        let cards = Arc::new(SidecarCardStore::new(
            Path::new(&config.data_root).join("credit_card.json"),
        ));

        Ok(Self {
            classifier,
            ctx: RunContext {
                account_email: config.user_email.clone(),
                datagen_script: config.datagen_script.clone(),
                embeddings,
                cards,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct RunQuery {
    task: String,
}

#[derive(Debug, Deserialize)]
struct ReadQuery {
    path: String,
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Build the route tree: `POST /run?task=…`, `GET /read?path=…`, with
/// permissive CORS on both.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let run = warp::path("run")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<RunQuery>())
        .and(with_state(state))
        .and_then(handle_run);

    let read = warp::path("read")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ReadQuery>())
        .and_then(handle_read);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_header("content-type");

    run.or(read).with(cors)
}

async fn handle_run(
    query: RunQuery,
    state: Arc<AppState>,
) -> Result<impl warp::Reply, Infallible> {
    let call = state.classifier.classify(&query.task).await;

    match dispatch::run_task(&query.task, call, &state.ctx).await {
        Ok(message) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "message": message })),
            StatusCode::OK,
        )),
        Err(e) => {
            eprintln!("[server] task failed: {e}");
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "detail": e.to_string() })),
                StatusCode::BAD_REQUEST,
            ))
        }
    }
}

async fn handle_read(query: ReadQuery) -> Result<impl warp::Reply, Infallible> {
    match tokio::fs::read_to_string(&query.path).await {
        Ok(body) => Ok(warp::reply::with_status(body, StatusCode::OK)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(warp::reply::with_status(
            "File not found".to_string(),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => Ok(warp::reply::with_status(
            e.to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

/// Serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) {
    eprintln!("[server] listening on {}", addr);
    warp::serve(routes(state)).run(addr).await;
}
