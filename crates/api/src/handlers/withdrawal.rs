use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use metrics::counter;
use rewards_domain::model::{WithdrawalRecord, WithdrawalStatus};
use rewards_domain::services::withdrawal::WithdrawalWorkflow;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

use crate::state::AppState;

use super::{authenticate, ApiError};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WithdrawalState {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl From<WithdrawalStatus> for WithdrawalState {
    fn from(status: WithdrawalStatus) -> Self {
        match status {
            WithdrawalStatus::Pending => WithdrawalState::Pending,
            WithdrawalStatus::Processing => WithdrawalState::Processing,
            WithdrawalStatus::Completed => WithdrawalState::Completed,
            WithdrawalStatus::Rejected => WithdrawalState::Rejected,
        }
    }
}

impl From<WithdrawalState> for WithdrawalStatus {
    fn from(state: WithdrawalState) -> Self {
        match state {
            WithdrawalState::Pending => WithdrawalStatus::Pending,
            WithdrawalState::Processing => WithdrawalStatus::Processing,
            WithdrawalState::Completed => WithdrawalStatus::Completed,
            WithdrawalState::Rejected => WithdrawalStatus::Rejected,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalView {
    pub id: i64,
    pub account_id: i64,
    pub amount: i64,
    pub recipient: String,
    pub status: WithdrawalState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WithdrawalRecord> for WithdrawalView {
    fn from(record: WithdrawalRecord) -> Self {
        Self {
            id: record.id.get(),
            account_id: record.account_id.get(),
            amount: record.amount,
            recipient: record.recipient.into_inner(),
            status: record.status.into(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WithdrawalRequest {
    pub amount: i64,
    #[serde(default)]
    pub recipient: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub withdrawal: WithdrawalView,
    pub balance: i64,
}

pub async fn request_withdrawal_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<WithdrawalRequest>,
) -> Result<HttpResponse, ApiError> {
    let session = authenticate(&state, &req).await?;
    let requested = WithdrawalWorkflow::new(state.storage(), state.ledger_config())
        .request(
            &session.account,
            payload.amount,
            payload.recipient.as_deref(),
        )
        .await
        .inspect_err(|err| {
            counter!("api_withdrawal_requests_total", "status" => err.kind()).increment(1);
        })?;
    counter!("api_withdrawal_requests_total", "status" => "created").increment(1);
    Ok(HttpResponse::Created().json(WithdrawalResponse {
        withdrawal: requested.withdrawal.into(),
        balance: requested.balance,
    }))
}

pub async fn withdrawal_history_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session = authenticate(&state, &req).await?;
    let records = WithdrawalWorkflow::new(state.storage(), state.ledger_config())
        .list_for_account(session.account.id)
        .await?;
    let body: Vec<WithdrawalView> = records.into_iter().map(WithdrawalView::from).collect();
    Ok(HttpResponse::Ok().json(body))
}
