use actix_web::{web, HttpRequest, HttpResponse};
use metrics::counter;
use rewards_domain::services::promocode::PromocodeRedemption;
use rewards_domain::services::telemetry::AbuseSignal;
use rewards_domain::RewardsError;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::{authenticate, ApiError};

#[derive(Debug, Deserialize, Serialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub reward: i64,
    pub balance: i64,
}

pub async fn redeem_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<RedeemRequest>,
) -> Result<HttpResponse, ApiError> {
    let session = authenticate(&state, &req).await?;
    let abuse_key = format!("redeem:{}", session.account.id);
    if state.abuse_tracker().is_escalated(&abuse_key) {
        counter!("api_redeem_requests_total", "status" => "throttled").increment(1);
        return Err(ApiError::TooManyAttempts);
    }

    match PromocodeRedemption::new(state.storage())
        .redeem(session.account.id, &payload.code)
        .await
    {
        Ok(redeemed) => {
            state.abuse_tracker().reset(&abuse_key);
            counter!("api_redeem_requests_total", "status" => "success").increment(1);
            Ok(HttpResponse::Ok().json(RedeemResponse {
                reward: redeemed.reward,
                balance: redeemed.balance,
            }))
        }
        Err(err) => {
            counter!("api_redeem_requests_total", "status" => err.kind()).increment(1);
            if is_guess(&err) {
                if let AbuseSignal::Escalated { .. } = state.abuse_tracker().record(&abuse_key) {
                    return Err(ApiError::TooManyAttempts);
                }
            }
            Err(err.into())
        }
    }
}

/// Failures a caller can produce by probing for codes.
fn is_guess(err: &RewardsError) -> bool {
    matches!(
        err,
        RewardsError::PromocodeNotFound
            | RewardsError::PromocodeExpired
            | RewardsError::PromocodeExhausted
            | RewardsError::AlreadyRedeemed
    )
}
