use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use rewards_domain::model::{AccountRecord, LedgerEntry, MAX_NICKNAME_CHANGES};
use rewards_domain::services::{identity::IdentityResolver, ledger::Ledger};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::{authenticate, ApiError};

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountView {
    pub id: i64,
    pub source: String,
    pub subject: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub nickname_changes_left: i16,
    pub balance: i64,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<AccountRecord> for AccountView {
    fn from(account: AccountRecord) -> Self {
        Self {
            id: account.id.get(),
            source: account.identity.source().as_str().to_string(),
            subject: account.identity.subject().to_string(),
            nickname: account.nickname,
            avatar_url: account.avatar_url,
            nickname_changes_left: (MAX_NICKNAME_CHANGES - account.nickname_changes).max(0),
            balance: account.balance,
            role: account.role.as_str().to_string(),
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerEntryView {
    pub delta: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryView {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            delta: entry.delta,
            reason: entry.reason.as_str().to_string(),
            reference: entry.reference,
            balance_after: entry.balance_after,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NicknameRequest {
    pub nickname: String,
}

pub async fn account_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session = authenticate(&state, &req).await?;
    Ok(HttpResponse::Ok().json(AccountView::from(session.account)))
}

pub async fn nickname_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<NicknameRequest>,
) -> Result<HttpResponse, ApiError> {
    let session = authenticate(&state, &req).await?;
    let updated = IdentityResolver::new(state.storage())
        .update_nickname(session.account.id, &payload.nickname)
        .await?;
    Ok(HttpResponse::Ok().json(AccountView::from(updated)))
}

pub async fn ledger_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session = authenticate(&state, &req).await?;
    let entries = Ledger::new(state.storage())
        .entries(session.account.id)
        .await?;
    let body: Vec<LedgerEntryView> = entries.into_iter().map(LedgerEntryView::from).collect();
    Ok(HttpResponse::Ok().json(body))
}
