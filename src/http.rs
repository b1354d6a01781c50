//! HTTP surface: ping, latest rates, one-currency series, and ingestion.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use log::{error, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::currency::CurrencyCode;
use crate::error::{RatesError, StorageError};
use crate::ingest::IngestionCoordinator;
use crate::views::{LatestRatesView, SeriesView, SortOrder};

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub struct AppState {
    pub latest: LatestRatesView,
    pub series: SeriesView,
    pub ingest: IngestionCoordinator,
    pub auth: IngestAuth,
}

/// Shared-secret check for the ingestion endpoint.
///
/// Both sides are hashed before comparing, so the time taken does not depend
/// on how much of the presented value matches the secret.
pub struct IngestAuth {
    header: String,
    digest: Vec<u8>,
}

impl IngestAuth {
    pub fn new(header: impl Into<String>, token: &str) -> Self {
        Self {
            header: header.into(),
            digest: Sha256::digest(token.as_bytes()).to_vec(),
        }
    }

    pub fn is_authorized(&self, req: &HttpRequest) -> bool {
        let Some(value) = req.headers().get(self.header.as_str()) else {
            return false;
        };
        Sha256::digest(value.as_bytes()).as_slice() == self.digest.as_slice()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_string(body) {
        Ok(body) => HttpResponse::build(status)
            .content_type(CONTENT_TYPE)
            .body(body),
        Err(e) => {
            error!("Can't serialize response: {e}");
            HttpResponse::InternalServerError()
                .content_type(CONTENT_TYPE)
                .finish()
        }
    }
}

fn error_body(status: StatusCode, message: String) -> HttpResponse {
    if status.is_server_error() || status == StatusCode::FAILED_DEPENDENCY {
        error!("{status}: {message}");
    } else {
        warn!("{status}: {message}");
    }
    json_response(status, &ErrorBody { error: message })
}

impl ResponseError for RatesError {
    fn status_code(&self) -> StatusCode {
        match self {
            RatesError::NotFound(_) => StatusCode::NOT_FOUND,
            RatesError::InvalidRequest(_) => StatusCode::NOT_IMPLEMENTED,
            RatesError::Unauthorized => StatusCode::UNAUTHORIZED,
            RatesError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RatesError::Transport(_)
            | RatesError::Format(_)
            | RatesError::Timestamp { .. }
            | RatesError::Decode(_)
            | RatesError::Storage(_) => StatusCode::FAILED_DEPENDENCY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.to_string())
    }
}

/// Ingestion failures use their own status mapping: fetch problems and
/// expired storage calls are a failed dependency, everything else that went
/// wrong after the feed arrived is reported as no content.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct IngestError(#[from] RatesError);

impl ResponseError for IngestError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            RatesError::Unauthorized => StatusCode::UNAUTHORIZED,
            RatesError::Transport(_)
            | RatesError::Timestamp { .. }
            | RatesError::Storage(StorageError::Timeout(_)) => StatusCode::FAILED_DEPENDENCY,
            RatesError::Format(_) | RatesError::Decode(_) | RatesError::Storage(_) => {
                StatusCode::NO_CONTENT
            }
            other => other.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.0.to_string())
    }
}

async fn ping() -> HttpResponse {
    json_response(StatusCode::OK, &serde_json::json!({ "ping:": "OK" }))
}

async fn latest(state: web::Data<AppState>) -> Result<HttpResponse, RatesError> {
    let latest = state.latest.latest().await?;
    Ok(json_response(StatusCode::OK, &latest))
}

async fn series(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, RatesError> {
    let (code, sort) = path.into_inner();
    let code = CurrencyCode::parse(&code)
        .map_err(|_| RatesError::invalid_request(format!("{code} not found")))?;
    let order: SortOrder = sort.parse()?;

    let rates = state.series.series(&code, order).await?;
    if rates.is_empty() {
        return Ok(HttpResponse::NoContent().content_type(CONTENT_TYPE).finish());
    }
    Ok(json_response(StatusCode::OK, &rates))
}

async fn set_rates(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, IngestError> {
    if !state.auth.is_authorized(&req) {
        return Err(RatesError::Unauthorized.into());
    }

    let report = state.ingest.run().await?;
    info!(
        "[{}] Rates set: {} inserted, {} skipped",
        report.run_id, report.inserted, report.skipped
    );
    Ok(json_response(StatusCode::CREATED, &report))
}

async fn not_found(req: HttpRequest) -> HttpResponse {
    error_body(
        StatusCode::NOT_FOUND,
        format!("no route for {} {}", req.method(), req.path()),
    )
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(ping))
        .route("/currencies/latest/", web::get().to(latest))
        .route("/currencies/one/{code}/{sort}/", web::get().to(series))
        .route("/currencies/set/", web::put().to(set_rates))
        .default_service(web::to(not_found));
}
