//! HTTP endpoints for inbound and outbound SMS.

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::accounts::AccountDirectory;
use crate::error::GatewayError;
use crate::optout::OptOutRegistry;
use crate::quota::{QuotaCounter, QuotaOutcome};
use crate::store::ExpiringStore;
use crate::validate::SmsRequest;

/// Key namespace for state created by inbound messages.
pub const INBOUND_PREFIX: &str = "INBOUND_";
/// Key namespace for state created by outbound messages.
pub const OUTBOUND_PREFIX: &str = "OUTBOUND_";

pub struct AppState {
    pub store: Arc<dyn ExpiringStore>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub opt_out: OptOutRegistry,
    pub quota: QuotaCounter,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/inbound/sms/", post(inbound))
        .route("/outbound/sms/", post(outbound))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SmsResponse {
    message: String,
    error: String,
}

/// Why a request was not accepted.
#[derive(Debug)]
pub enum GatewayRejection {
    /// Malformed request or unknown number
    Validation(String),
    /// Bad credentials
    Forbidden,
    /// Opt-out or quota
    Policy(String),
    /// Store or lock failure
    Infrastructure(GatewayError),
}

impl From<GatewayError> for GatewayRejection {
    fn from(e: GatewayError) -> Self {
        GatewayRejection::Infrastructure(e)
    }
}

impl IntoResponse for GatewayRejection {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            GatewayRejection::Validation(reason) | GatewayRejection::Policy(reason) => {
                (StatusCode::OK, reason)
            }
            GatewayRejection::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            GatewayRejection::Infrastructure(e) => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "unknown failure".to_string())
            }
        };

        let body = SmsResponse {
            message: String::new(),
            error,
        };
        (status, Json(body)).into_response()
    }
}

fn accepted(message: &str) -> Json<SmsResponse> {
    Json(SmsResponse {
        message: message.to_string(),
        error: String::new(),
    })
}

/// Authenticate the caller and check that `number` belongs to them.
fn authorize(
    state: &AppState,
    req: &SmsRequest,
    number: &str,
    field: &str,
) -> Result<(), GatewayRejection> {
    let account = state
        .accounts
        .authenticate(
            req.username.as_deref().unwrap_or_default(),
            req.password.as_deref().unwrap_or_default(),
        )
        .ok_or(GatewayRejection::Forbidden)?;

    if !state.accounts.owns_number(&account, number) {
        return Err(GatewayRejection::Validation(format!(
            "{field} parameter not found"
        )));
    }

    Ok(())
}

/// A body that is not a form is treated as one with no fields, so the caller
/// gets the usual missing-parameter error.
fn form_fields(form: Result<Form<SmsRequest>, FormRejection>) -> SmsRequest {
    match form {
        Ok(Form(req)) => req,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable form body");
            SmsRequest::default()
        }
    }
}

async fn inbound(
    State(state): State<Arc<AppState>>,
    form: Result<Form<SmsRequest>, FormRejection>,
) -> Result<Json<SmsResponse>, GatewayRejection> {
    let req = form_fields(form);
    let sms = req.validate().map_err(GatewayRejection::Validation)?;
    authorize(&state, &req, sms.to, "to")?;

    let key = format!("{INBOUND_PREFIX}{}", sms.from);
    state
        .opt_out
        .register_if_stop_request(sms.text, &key, sms.to)
        .await?;

    Ok(accepted("inbound sms ok"))
}

async fn outbound(
    State(state): State<Arc<AppState>>,
    form: Result<Form<SmsRequest>, FormRejection>,
) -> Result<Json<SmsResponse>, GatewayRejection> {
    let req = form_fields(form);
    let sms = req.validate().map_err(GatewayRejection::Validation)?;
    authorize(&state, &req, sms.from, "from")?;

    let opt_out_key = format!("{INBOUND_PREFIX}{}", sms.to);
    if state.opt_out.is_blocked(&opt_out_key, sms.from).await? {
        info!(from = %sms.from, to = %sms.to, "blocked by opt-out");
        return Err(GatewayRejection::Policy(format!(
            "sms from {} to {} blocked by STOP request",
            sms.from, sms.to
        )));
    }

    let quota_key = format!("{OUTBOUND_PREFIX}{}", sms.from);
    let outcome = state.quota.check_and_increment(&quota_key).await?;
    if let QuotaOutcome::LimitReached { reason } = outcome {
        info!(from = %sms.from, reason, "outbound quota exhausted");
        return Err(GatewayRejection::Policy(format!(
            "limit reached for from {}",
            sms.from
        )));
    }

    Ok(accepted("outbound sms ok"))
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.get("HEALTHZ").await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            error!(error = %e, "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
