use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use metrics::counter;
use rewards_domain::model::{AccountId, PromocodeRecord, Role, WithdrawalFilter, WithdrawalId};
use rewards_domain::services::{
    identity::IdentityResolver,
    ledger::Ledger,
    promocode::{PromocodeDraft, PromocodeRedemption},
    withdrawal::WithdrawalWorkflow,
};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

use crate::state::AppState;

use super::{
    account::AccountView,
    authenticate,
    withdrawal::{WithdrawalState, WithdrawalView},
    ApiError,
};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WithdrawalQuery {
    pub status: Option<WithdrawalState>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusRequest {
    pub status: WithdrawalState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub withdrawal: WithdrawalView,
    pub refunded: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatePromocodeRequest {
    pub code: String,
    pub reward: i64,
    pub max_uses: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromocodeView {
    pub id: i64,
    pub code: String,
    pub reward: i64,
    pub max_uses: i64,
    pub current_uses: i64,
    pub remaining_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PromocodeRecord> for PromocodeView {
    fn from(record: PromocodeRecord) -> Self {
        let remaining_uses = record.remaining_uses();
        Self {
            id: record.id,
            code: record.code.into_inner(),
            reward: record.reward,
            max_uses: record.max_uses,
            current_uses: record.current_uses,
            remaining_uses,
            expires_at: record.expires_at,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BalanceRequest {
    pub delta: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoleName {
    User,
    Admin,
}

impl From<RoleName> for Role {
    fn from(name: RoleName) -> Self {
        match name {
            RoleName::User => Role::User,
            RoleName::Admin => Role::Admin,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RoleRequest {
    pub role: RoleName,
}

fn record(endpoint: &'static str, result: &Result<HttpResponse, ApiError>) {
    let status = match result {
        Ok(_) => "success",
        Err(err) => err.code(),
    };
    counter!("api_admin_requests_total", "endpoint" => endpoint, "status" => status).increment(1);
}

pub async fn list_withdrawals_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<WithdrawalQuery>,
) -> Result<HttpResponse, ApiError> {
    let result = async {
        let session = authenticate(&state, &req).await?;
        let query = query.into_inner();
        let filter = WithdrawalFilter {
            status: query.status.map(Into::into),
            account_id: None,
            search: query.search.filter(|value| !value.trim().is_empty()),
        };
        let records = WithdrawalWorkflow::new(state.storage(), state.ledger_config())
            .list(&session.account, &filter)
            .await?;
        let body: Vec<WithdrawalView> = records.into_iter().map(WithdrawalView::from).collect();
        Ok::<_, ApiError>(HttpResponse::Ok().json(body))
    }
    .await;
    record("list_withdrawals", &result);
    result
}

pub async fn withdrawal_status_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<StatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = async {
        let session = authenticate(&state, &req).await?;
        let resolved = WithdrawalWorkflow::new(state.storage(), state.ledger_config())
            .transition(
                &session.account,
                WithdrawalId::new(path.into_inner()),
                payload.status.into(),
            )
            .await?;
        let target_tag = payload.status.as_ref().to_owned();
        counter!("api_withdrawal_transitions_total", "target" => target_tag).increment(1);
        Ok::<_, ApiError>(HttpResponse::Ok().json(StatusResponse {
            withdrawal: resolved.withdrawal.into(),
            refunded: resolved.refunded,
        }))
    }
    .await;
    record("withdrawal_status", &result);
    result
}

pub async fn list_promocodes_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let result = async {
        let session = authenticate(&state, &req).await?;
        let records = PromocodeRedemption::new(state.storage())
            .list(&session.account)
            .await?;
        let body: Vec<PromocodeView> = records.into_iter().map(PromocodeView::from).collect();
        Ok::<_, ApiError>(HttpResponse::Ok().json(body))
    }
    .await;
    record("list_promocodes", &result);
    result
}

pub async fn create_promocode_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<CreatePromocodeRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = async {
        let session = authenticate(&state, &req).await?;
        let payload = payload.into_inner();
        let created = PromocodeRedemption::new(state.storage())
            .create(
                &session.account,
                PromocodeDraft {
                    code: payload.code,
                    reward: payload.reward,
                    max_uses: payload.max_uses,
                    expires_at: payload.expires_at,
                },
            )
            .await?;
        Ok::<_, ApiError>(HttpResponse::Created().json(PromocodeView::from(created)))
    }
    .await;
    record("create_promocode", &result);
    result
}

pub async fn adjust_balance_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<BalanceRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = async {
        let session = authenticate(&state, &req).await?;
        let target = AccountId::new(path.into_inner());
        let payload = payload.into_inner();
        let balance = Ledger::new(state.storage())
            .adjust(&session.account, target, payload.delta, payload.reference)
            .await?;
        Ok::<_, ApiError>(HttpResponse::Ok().json(BalanceResponse {
            account_id: target.get(),
            balance,
        }))
    }
    .await;
    record("adjust_balance", &result);
    result
}

pub async fn assign_role_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<RoleRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = async {
        let session = authenticate(&state, &req).await?;
        let updated = IdentityResolver::new(state.storage())
            .assign_role(
                &session.account,
                AccountId::new(path.into_inner()),
                payload.role.into(),
            )
            .await?;
        let role_tag = payload.role.as_ref().to_owned();
        counter!("api_role_assignments_total", "role" => role_tag).increment(1);
        Ok::<_, ApiError>(HttpResponse::Ok().json(AccountView::from(updated)))
    }
    .await;
    record("assign_role", &result);
    result
}
