//! HTTP surface: the query endpoint and the admin endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use vtrack_core::config::Config;
use vtrack_maven::{MavenRepoClient, MavenRepository};
use vtrack_store::{CachingStore, FlatFileStore, StoreFormat, VersionStore};
use vtrack_tracker::proto;
use vtrack_tracker::{ApiFacade, BackgroundUpdater, SharedLockCache, StalePolicy, VersionTracker};
use vtrack_util::errors::VtrackError;
use vtrack_util::time::format_wire_timestamp;

use crate::cli::Cli;

#[derive(Clone)]
struct AppState {
    api: Arc<ApiFacade>,
    tracker: Arc<VersionTracker>,
    storage: Arc<CachingStore>,
}

/// Wire everything together and serve until interrupted.
pub async fn run(args: Cli) -> miette::Result<()> {
    let mut config = match args.config {
        Some(ref path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    if let Some(data_file) = args.data_file {
        config.data_file = data_file;
    }
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }
    let format = if args.text_format {
        StoreFormat::Text
    } else {
        StoreFormat::Binary
    };

    let flat = FlatFileStore::open(&config.data_file, format)?;
    let storage = Arc::new(CachingStore::new(Arc::new(flat), config.flush_interval));

    let repository = MavenRepository::new(&config.repository_base_url);
    let provider = Arc::new(MavenRepoClient::new(repository, config.blacklist.clone())?);

    let policy = StalePolicy {
        after_success: config.update_delay_after_success,
        after_failure: config.update_delay_after_failure,
    };
    let tracker = Arc::new(VersionTracker::new(
        storage.clone() as Arc<dyn VersionStore>,
        provider,
        SharedLockCache::new(config.max_locks),
        config.max_concurrent_threads,
        config.batch_deadline,
    ));
    let updater = BackgroundUpdater::start(
        tracker.clone(),
        storage.clone() as Arc<dyn VersionStore>,
        policy,
        config.bg_update_check_interval,
    );

    let api = Arc::new(ApiFacade::new(
        tracker.clone(),
        config.blacklist.clone(),
        policy,
    ));
    let state = AppState {
        api,
        tracker,
        storage: storage.clone(),
    };

    let app = Router::new()
        .route("/query", post(query))
        .route("/status", get(status))
        .route("/triggerRefresh", get(trigger_refresh))
        .route("/autocomplete", get(autocomplete))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .map_err(|e| VtrackError::Network {
            message: format!("Failed to bind {}: {e}", config.listen_address),
        })?;
    tracing::info!("Listening on {}", config.listen_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| VtrackError::Network {
            message: format!("Server error: {e}"),
        })?;

    tracing::info!("Shutting down");
    updater.shutdown().await;
    storage.close()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl-C handler: {e}");
    }
}

/// `POST /query`: JSON body, or a protocol-framed binary body.
async fn query(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        let request = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("invalid JSON request: {e}"))
                    .into_response()
            }
        };
        return match state.api.process_query(request).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => error_response(e),
        };
    }

    // Binary envelope: first byte selects the protocol, the response is
    // framed the same way.
    let (protocol, request) = match proto::decode_framed_request(&body) {
        Ok(decoded) => decoded,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    match state.api.process_query(request).await {
        Ok(response) => match proto::encode_framed_response(protocol, &response) {
            Ok(framed) => (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                framed,
            )
                .into_response(),
            Err(e) => error_response(e),
        },
        Err(e) => error_response(e),
    }
}

/// `GET /status`: counts and last-flush time.
async fn status(State(state): State<AppState>) -> Response {
    let stats = match state.storage.statistics() {
        Ok(stats) => stats,
        Err(e) => return error_response(e),
    };
    let last_flush = state
        .storage
        .last_flush_time()
        .map(format_wire_timestamp);
    Json(serde_json::json!({
        "serverVersion": vtrack_tracker::api::SERVER_VERSION,
        "entryCount": stats.entry_count,
        "fileSizeBytes": stats.file_size_bytes,
        "lastFlush": last_flush,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshParams {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
}

/// `GET /triggerRefresh?groupId=&artifactId=[&version]`: enqueue a forced
/// refresh. The optional version names a version whose publication date
/// should be scraped along with the refresh.
async fn trigger_refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Response {
    let (group_id, artifact_id) = match (&params.group_id, &params.artifact_id) {
        (Some(g), Some(a)) if !g.trim().is_empty() && !a.trim().is_empty() => {
            (g.trim().to_string(), a.trim().to_string())
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "groupId and artifactId are required",
            )
                .into_response()
        }
    };
    let version = params
        .version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    match state.storage.get_version_info(&group_id, &artifact_id) {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return error_response(e),
    }

    let tracker = state.tracker.clone();
    tokio::spawn(async move {
        match tracker
            .force_update(&group_id, &artifact_id, version.as_deref())
            .await
        {
            Ok(outcome) => tracing::debug!("Forced refresh of {group_id}:{artifact_id}: {outcome:?}"),
            Err(e) => tracing::warn!("Forced refresh of {group_id}:{artifact_id} failed: {e:?}"),
        }
    });
    StatusCode::OK.into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutocompleteParams {
    kind: Option<String>,
    group_id: Option<String>,
    user_input: Option<String>,
}

/// `GET /autocomplete?kind=groupId|artifactId&groupId=&userInput=`
async fn autocomplete(
    State(state): State<AppState>,
    Query(params): Query<AutocompleteParams>,
) -> Response {
    let prefix = params.user_input.unwrap_or_default();
    let completions = match params.kind.as_deref() {
        Some("groupId") => state.storage.complete_group_ids(&prefix),
        Some("artifactId") => {
            let Some(group_id) = params.group_id else {
                return (
                    StatusCode::BAD_REQUEST,
                    "groupId is required for artifactId completion",
                )
                    .into_response();
            };
            state.storage.complete_artifact_ids(&group_id, &prefix)
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "kind must be groupId or artifactId",
            )
                .into_response()
        }
    };
    match completions {
        Ok(values) => Json(values).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(error: miette::Report) -> Response {
    let message = error.to_string();
    let status = if message.starts_with("Bad request") {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::debug!("Request failed: {message}");
    (status, message).into_response()
}
