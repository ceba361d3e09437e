pub mod account;
pub mod admin;
pub mod auth;
pub mod metrics;
pub mod promocode;
pub mod withdrawal;

pub use account::{account_handler, ledger_handler, nickname_handler};
pub use admin::{
    adjust_balance_handler, assign_role_handler, create_promocode_handler,
    list_promocodes_handler, list_withdrawals_handler, withdrawal_status_handler,
};
pub use auth::{discord_login_handler, game_login_handler, logout_handler};
pub use metrics::metrics_handler;
pub use promocode::redeem_handler;
pub use withdrawal::{request_withdrawal_handler, withdrawal_history_handler};

use actix_web::{http::header, http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use rewards_domain::model::SessionToken;
use rewards_domain::provider::ProviderError;
use rewards_domain::services::session::{Session, SessionManager};
use rewards_domain::RewardsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::AppState;

/// Where the UI should send the user after a failed provider sign-in.
const LANDING_PATH: &str = "/";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rewards(#[from] RewardsError),
    #[error("missing or malformed bearer token")]
    MissingToken,
    #[error("too many failed attempts, try again later")]
    TooManyAttempts,
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Rewards(err) => err.kind(),
            ApiError::MissingToken => "unauthenticated",
            ApiError::TooManyAttempts => "too_many_attempts",
            ApiError::BadRequest(_) => "validation",
        }
    }

    fn redirect(&self) -> Option<&'static str> {
        match self {
            ApiError::Rewards(RewardsError::AuthProvider(_)) => Some(LANDING_PATH),
            _ => None,
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::Rewards(RewardsError::AuthProvider(err))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Rewards(err) => match err {
                RewardsError::Validation(_) => StatusCode::BAD_REQUEST,
                RewardsError::AuthProvider(ProviderError::NotConfigured) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RewardsError::AuthProvider(ProviderError::MissingCode) => StatusCode::BAD_REQUEST,
                RewardsError::AuthProvider(_) => StatusCode::BAD_GATEWAY,
                RewardsError::Unauthenticated => StatusCode::UNAUTHORIZED,
                RewardsError::Authorization => StatusCode::FORBIDDEN,
                RewardsError::PromocodeNotFound
                | RewardsError::AccountNotFound
                | RewardsError::WithdrawalNotFound => StatusCode::NOT_FOUND,
                RewardsError::PromocodeExpired => StatusCode::GONE,
                RewardsError::InsufficientBalance { .. }
                | RewardsError::PromocodeExhausted
                | RewardsError::AlreadyRedeemed
                | RewardsError::DuplicatePromocode
                | RewardsError::NicknameLocked
                | RewardsError::InvalidTransition { .. } => StatusCode::CONFLICT,
                RewardsError::Entropy(_) | RewardsError::Persistence(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::MissingToken => StatusCode::UNAUTHORIZED,
            ApiError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Storage details stay in the logs.
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorBody {
            error,
            code: self.code().to_string(),
            redirect: self.redirect().map(str::to_string),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// Reads `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(req: &HttpRequest) -> Result<SessionToken, ApiError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::MissingToken)?;
    let (scheme, token) = value.trim().split_once(' ').ok_or(ApiError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ApiError::MissingToken);
    }
    Ok(SessionToken::new(token))
}

pub(crate) async fn authenticate(state: &AppState, req: &HttpRequest) -> Result<Session, ApiError> {
    let token = bearer_token(req)?;
    let session = SessionManager::new(state.storage(), state.sessions())
        .authenticate(&token)
        .await?;
    Ok(session)
}
