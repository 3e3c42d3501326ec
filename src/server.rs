use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::error::{Error, Result};
use crate::service::{CircleRequest, PredictionResult, ServiceContext};

pub const STATUS_MESSAGE: &str = "API is running in 'Intelligent Hardcoded' mode.";

/// A failed request, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match error {
            Error::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            detail: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection {
            JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => rejection.status(),
        };
        ApiError {
            status,
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": STATUS_MESSAGE }))
}

async fn predict_circle(
    State(context): State<Arc<ServiceContext>>,
    payload: std::result::Result<Json<CircleRequest>, JsonRejection>,
) -> std::result::Result<Json<Vec<PredictionResult>>, ApiError> {
    let Json(request) = payload?;
    log::debug!("predict-circle {request:?}");
    let outcome = tokio::task::spawn_blocking(move || {
        context.predict_circle(&request, &mut rand::thread_rng())
    })
    .await;

    match outcome {
        Ok(Ok(results)) => Ok(Json(results)),
        Ok(Err(e)) => {
            log::error!("Prediction failed for {request:?}: {e}");
            Err(e.into())
        }
        Err(e) => {
            log::error!("Prediction task for {request:?} did not complete: {e}");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: e.to_string(),
            })
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| Error::InvalidInput(format!("invalid CORS origin '{origin}'")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn router(context: Arc<ServiceContext>, allowed_origins: &[String]) -> Result<Router> {
    Ok(Router::new()
        .route("/", get(root))
        .route("/predict-circle", post(predict_circle))
        .layer(cors_layer(allowed_origins)?)
        .with_state(context))
}

/// Serves until the process is stopped.
pub async fn serve(
    context: ServiceContext,
    addr: SocketAddr,
    allowed_origins: &[String],
) -> Result<()> {
    let app = router(Arc::new(context), allowed_origins)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
