use actix_web::{web, HttpRequest, HttpResponse};
use metrics::counter;
use rewards_domain::model::IdentityAssertion;
use rewards_domain::provider::ProviderError;
use rewards_domain::services::identity::IdentityResolver;
use rewards_domain::services::session::SessionManager;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AppState;

use super::{account::AccountView, bearer_token, ApiError};

#[derive(Debug, Deserialize, Serialize)]
pub struct GameLoginRequest {
    pub game_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DiscordLoginRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub created: bool,
    pub account: AccountView,
}

pub async fn game_login_handler(
    state: web::Data<AppState>,
    payload: web::Json<GameLoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let assertion = IdentityAssertion::Game(payload.into_inner().game_id);
    sign_in(&state, assertion, "game").await
}

pub async fn discord_login_handler(
    state: web::Data<AppState>,
    payload: web::Json<DiscordLoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let Some(provider) = state.discord() else {
        counter!("api_auth_requests_total", "provider" => "discord", "status" => "not_configured")
            .increment(1);
        return Err(ProviderError::NotConfigured.into());
    };
    let profile = provider.exchange(&payload.code).await.inspect_err(|err| {
        counter!("api_auth_requests_total", "provider" => "discord", "status" => "provider_error")
            .increment(1);
        warn!(?err, "discord sign-in failed");
    })?;
    sign_in(&state, IdentityAssertion::External(profile), "discord").await
}

pub async fn logout_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = bearer_token(&req)?;
    SessionManager::new(state.storage(), state.sessions())
        .close(&token)
        .await?;
    counter!("api_auth_requests_total", "provider" => "session", "status" => "logout").increment(1);
    Ok(HttpResponse::NoContent().finish())
}

async fn sign_in(
    state: &AppState,
    assertion: IdentityAssertion,
    provider: &'static str,
) -> Result<HttpResponse, ApiError> {
    let resolution = IdentityResolver::new(state.storage())
        .resolve(assertion)
        .await
        .inspect_err(|err| {
            counter!("api_auth_requests_total", "provider" => provider, "status" => err.kind())
                .increment(1);
        })?;
    let (token, session) = SessionManager::new(state.storage(), state.sessions())
        .open(resolution.account)
        .await?;

    let status = if resolution.created { "created" } else { "success" };
    counter!("api_auth_requests_total", "provider" => provider, "status" => status).increment(1);
    Ok(HttpResponse::Ok().json(LoginResponse {
        token: token.into_inner(),
        created: resolution.created,
        account: AccountView::from(session.account),
    }))
}
