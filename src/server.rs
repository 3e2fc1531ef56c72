use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{rejection::QueryRejection, DefaultBodyLimit, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::app::credential_issuer::CredentialIssuer;
use crate::app::event_gate::EventGate;
use crate::app::job_dispatcher::JobDispatcher;
use crate::app::ports::{IdentityPort, ObjectStoragePort, QueuePort, SubmissionStore};
use crate::app::submission_use_case::{FinalizeOutcome, SubmissionPipeline};
use crate::config::{Config, DatabaseLocation, QueueBackend, ServerConfig, StorageBackend};
use crate::constants::{MAX_LOCAL_UPLOAD_BYTES, REQUEST_ID_HEADER};
use crate::domain::{OwnerId, SubmissionId, SubmissionStatus};
use crate::error::{EventRejected, QuickpitchError, Result, SubmissionError};
use crate::infra::file_queue::FileQueue;
use crate::infra::local_storage::LocalObjectStorage;
use crate::infra::s3_storage::S3ObjectStorage;
use crate::infra::session_identity::SessionEndpointIdentity;
use crate::infra::sigv4::AwsCredentials;
use crate::infra::sqlite_store::SqliteSubmissionStore;
use crate::infra::sqs_queue::SqsQueue;
use crate::metrics::SubmissionMetrics;
use crate::storage::InMemorySubmissionStore;

/// Everything the handlers need, wired once at startup.
pub struct AppState {
    pub pipeline: Arc<SubmissionPipeline>,
    pub gate: Arc<EventGate>,
    pub identity: Arc<dyn IdentityPort>,
    /// Present only when uploads are served by this process.
    pub local_uploads: Option<Arc<LocalObjectStorage>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Builds adapters for the configured backends.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn SubmissionStore> = match config.database.location() {
            DatabaseLocation::Memory => Arc::new(InMemorySubmissionStore::new()),
            DatabaseLocation::File(path) => Arc::new(SqliteSubmissionStore::open(path)?),
        };

        let webhook_secret = config.webhook_secret()?;
        let gate = EventGate::new(webhook_secret, config.webhook.tolerance_secs)?;

        let (storage, local_uploads): (Arc<dyn ObjectStoragePort>, Option<Arc<LocalObjectStorage>>) =
            match config.storage.backend {
                StorageBackend::S3 => {
                    let s3 = S3ObjectStorage::new(
                        aws_credentials(config)?,
                        config.aws.region.clone(),
                        config.storage.endpoint.as_deref(),
                        Duration::from_secs(config.storage.timeout_secs),
                    )?;
                    (Arc::new(s3) as Arc<dyn ObjectStoragePort>, None)
                }
                StorageBackend::Local => {
                    let signing_key = config
                        .storage
                        .local_signing_key
                        .as_deref()
                        .unwrap_or(webhook_secret);
                    let local = Arc::new(LocalObjectStorage::new(
                        &config.storage.local_root,
                        config.server.public_base_url(),
                        signing_key.as_bytes(),
                    )?);
                    (local.clone() as Arc<dyn ObjectStoragePort>, Some(local))
                }
            };

        let queue: Arc<dyn QueuePort> = match config.queue.backend {
            QueueBackend::Sqs => Arc::new(SqsQueue::new(
                aws_credentials(config)?,
                config.aws.region.clone(),
                Duration::from_secs(config.queue.timeout_secs),
            )?),
            QueueBackend::File => Arc::new(FileQueue::new(&config.queue.file_path)),
        };

        let identity = SessionEndpointIdentity::new(
            config.auth.session_url.clone(),
            Duration::from_secs(config.auth.timeout_secs),
        )?;

        let pipeline = SubmissionPipeline::new(
            store,
            CredentialIssuer::new(storage, Duration::from_secs(config.storage.upload_ttl_secs)),
            JobDispatcher::new(queue, config.queue.url.clone()),
            config.storage.bucket.clone(),
        )
        .with_verification(config.finalize.verification);

        Ok(Self {
            pipeline: Arc::new(pipeline),
            gate: Arc::new(gate),
            identity: Arc::new(identity),
            local_uploads,
        })
    }
}

fn aws_credentials(config: &Config) -> Result<AwsCredentials> {
    match (&config.aws.access_key_id, &config.aws.secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(AwsCredentials {
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
            session_token: config.aws.session_token.clone(),
        }),
        _ => Err(QuickpitchError::Config("AWS credentials are not configured".to_string())),
    }
}

// Response envelope

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: String,
    pub code: u16,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn success<T: Serialize>(code: StatusCode, message: &str, data: Option<T>) -> Response {
    let body = Envelope {
        message: message.to_string(),
        code: code.as_u16(),
        status: "success",
        data,
    };
    (code, Json(body)).into_response()
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            message: self.message,
            code: self.status.as_u16(),
            status: "error",
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}

/// HTTP status for each pipeline outcome.
pub fn status_for(err: &SubmissionError) -> StatusCode {
    match err {
        SubmissionError::Validation(_) => StatusCode::BAD_REQUEST,
        SubmissionError::NotFound => StatusCode::NOT_FOUND,
        SubmissionError::Incomplete { .. } => StatusCode::CONFLICT,
        SubmissionError::StorageUnavailable(_) | SubmissionError::DispatchFailed(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SubmissionError::Rejected(_) => StatusCode::BAD_REQUEST,
        SubmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        let status = status_for(&err);
        let message = match &err {
            SubmissionError::NotFound => "resource not found".to_string(),
            SubmissionError::Internal(source) => {
                error!("Request failed: {}", source);
                "Something went wrong".to_string()
            }
            SubmissionError::StorageUnavailable(source) | SubmissionError::DispatchFailed(source) => {
                error!("{}: {}", err, source);
                err.to_string()
            }
            _ => err.to_string(),
        };
        Self::new(status, message)
    }
}

// Identity

/// Caller resolved through the identity port. Rejects with 401 before the
/// handler runs, including when the identity provider cannot be reached.
pub struct CurrentOwner(pub OwnerId);

#[async_trait]
impl FromRequestParts<SharedState> for CurrentOwner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> std::result::Result<Self, Self::Rejection> {
        match state.identity.resolve(&parts.headers).await {
            Ok(Some(owner)) => Ok(CurrentOwner(owner)),
            Ok(None) => Err(ApiError::unauthorized()),
            Err(e) => {
                warn!("Identity resolution failed: {}", e);
                Err(ApiError::unauthorized())
            }
        }
    }
}

// Handlers

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "quickpitch",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct StartPitchRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartPitchResponse {
    id: SubmissionId,
    resume_file_key: String,
    video_file_key: String,
    resume_upload_url: String,
    video_upload_url: String,
    upload_method: String,
    upload_expires_at: DateTime<Utc>,
}

async fn create_pitch(
    State(state): State<SharedState>,
    CurrentOwner(owner): CurrentOwner,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let request: StartPitchRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid request data"))?;
    let started = state
        .pipeline
        .start(&owner, request.name.as_deref().unwrap_or_default())
        .await?;

    let response = StartPitchResponse {
        id: started.submission.id,
        resume_file_key: started.resume_upload.key,
        video_file_key: started.video_upload.key,
        resume_upload_url: started.resume_upload.url,
        video_upload_url: started.video_upload.url,
        upload_method: started.resume_upload.method,
        upload_expires_at: started.resume_upload.expires_at.min(started.video_upload.expires_at),
    };
    Ok(success(StatusCode::CREATED, "Pitch drafted", Some(response)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeResponse {
    id: SubmissionId,
    status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
}

async fn finalize_pitch(
    State(state): State<SharedState>,
    CurrentOwner(owner): CurrentOwner,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let id = SubmissionId::new(id);
    let response = match state.pipeline.finalize(&owner, &id).await? {
        FinalizeOutcome::Queued { message_id } => success(
            StatusCode::OK,
            "Pitch queued for processing",
            Some(FinalizeResponse {
                id,
                status: SubmissionStatus::Queued,
                message_id: Some(message_id),
            }),
        ),
        FinalizeOutcome::AlreadyFinalized(status) => success(
            StatusCode::OK,
            "Pitch already finalized",
            Some(FinalizeResponse {
                id,
                status,
                message_id: None,
            }),
        ),
    };
    Ok(response)
}

async fn get_pitch(
    State(state): State<SharedState>,
    CurrentOwner(owner): CurrentOwner,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let submission = state.pipeline.get(&owner, &SubmissionId::new(id)).await?;
    Ok(success(StatusCode::OK, "", Some(submission)))
}

async fn list_pitches(
    State(state): State<SharedState>,
    CurrentOwner(owner): CurrentOwner,
) -> std::result::Result<Response, ApiError> {
    let submissions = state.pipeline.list(&owner).await?;
    Ok(success(StatusCode::OK, "", Some(submissions)))
}

async fn delete_pitch(
    State(state): State<SharedState>,
    CurrentOwner(owner): CurrentOwner,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let id = SubmissionId::new(id);
    state.pipeline.delete(&owner, &id).await?;
    Ok(success(
        StatusCode::OK,
        "Pitch deleted",
        Some(serde_json::json!({ "id": id })),
    ))
}

/// Worker callback. Forged or stale deliveries get a bare 401; authentic
/// events that cannot be applied are acknowledged so the sender stops retrying.
async fn completion_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = match state.gate.verify(&body, &headers) {
        Ok(event) => event,
        Err(EventRejected) => {
            SubmissionMetrics::record_webhook("rejected");
            warn!("Rejected completion webhook");
            return ApiError::unauthorized().into_response();
        }
    };

    match state.pipeline.complete(&event).await {
        Ok(ack) => {
            SubmissionMetrics::record_webhook("applied");
            success(
                StatusCode::OK,
                "Event applied",
                Some(serde_json::json!({
                    "submissionId": ack.submission_id,
                    "status": ack.status,
                })),
            )
        }
        Err(err @ (SubmissionError::NotFound | SubmissionError::Rejected(_))) => {
            SubmissionMetrics::record_webhook("ignored");
            warn!(message_id = %event.message_id, "Ignoring completion event: {}", err);
            success::<()>(StatusCode::OK, "Event ignored", None)
        }
        Err(err) => {
            SubmissionMetrics::record_webhook("error");
            ApiError::from(err).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    expires: i64,
    sig: String,
}

async fn local_upload(
    State(state): State<SharedState>,
    Path((bucket, key)): Path<(String, String)>,
    query: std::result::Result<Query<UploadQuery>, QueryRejection>,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let storage = state
        .local_uploads
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "resource not found"))?;
    let forbidden = || ApiError::new(StatusCode::FORBIDDEN, "Invalid or expired upload signature");
    let Query(query) = query.map_err(|_| forbidden())?;
    if !storage.verify_upload(&bucket, &key, query.expires, &query.sig, Utc::now()) {
        return Err(forbidden());
    }

    let meta = storage.write_object(&bucket, &key, &body).await.map_err(|e| {
        error!("Failed to store upload {}/{}: {}", bucket, key, e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload")
    })?;
    Ok(success(StatusCode::OK, "Upload stored", Some(meta)))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .expose_headers([header::HeaderName::from_static(REQUEST_ID_HEADER)])
        .allow_credentials(true)
        .max_age(Duration::from_secs(600))
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let local_uploads_enabled = state.local_uploads.is_some();
    let state: SharedState = Arc::new(state);

    let mut router: Router<SharedState> = Router::new()
        .route("/health", get(health))
        .route("/pitch", post(create_pitch).get(list_pitches))
        .route("/pitch/:id", get(get_pitch).delete(delete_pitch))
        .route("/pitch/:id/finalize", patch(finalize_pitch))
        .route("/webhooks/completion", post(completion_webhook));

    if local_uploads_enabled {
        router = router.route(
            "/uploads/:bucket/:key",
            put(local_upload).layer(DefaultBodyLimit::max(MAX_LOCAL_UPLOAD_BYTES)),
        );
    }

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "http",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(trace)
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer(&config.cors_origins)),
        )
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn start_server(state: AppState, config: &ServerConfig) -> Result<()> {
    let app = create_router(state, config);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| QuickpitchError::Config(format!("invalid listen address: {e}")))?;

    info!("HTTP server running on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .map_err(|e| QuickpitchError::internal(format!("server error: {e}")))?;

    Ok(())
}
