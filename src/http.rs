// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! JSON REST API over a [`Bank`].
//!
//! All routes live under `/api`. Authenticated routes expect
//! `Authorization: Bearer <token>`.
//!
//! ## Example Usage
//!
//! ```bash
//! # Sign up, then log in once an administrator approved the account
//! curl -X POST http://localhost:8001/api/signup \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "ana@example.com", "password": "s3cret", "full_name": "Ana"}'
//! curl -X POST http://localhost:8001/api/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "ana@example.com", "password": "s3cret"}'
//!
//! # Request a transfer from checking to savings
//! curl -X POST http://localhost:8001/api/transfer \
//!   -H "Authorization: Bearer $TOKEN" -H "Content-Type: application/json" \
//!   -d '{"transaction_type": "self", "from_account_type": "checking",
//!        "to_account_info": "savings", "amount": "200.00"}'
//! ```

use crate::account::{Account, AccountProfile};
use crate::auth::{ForcedLogout, Principal};
use crate::bank::{AccountOverview, ApprovedLogin, Bank, Dashboard, LoginOutcome, SignupRequest};
use crate::base::{AccountId, ApprovalId, TransactionId};
use crate::error::BankError;
use crate::login_approval::{LoginApproval, LoginApprovalStatus, LoginDecision};
use crate::session::Session;
use crate::transaction::{Decision, ManualAdjustment, Transaction, TransferRequest};
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignupAction {
    Approve,
    Decline,
}

#[derive(Debug, Deserialize)]
pub struct SignupDecisionRequest {
    pub user_id: AccountId,
    pub action: SignupAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreezeAction {
    Freeze,
    Unfreeze,
}

#[derive(Debug, Deserialize)]
pub struct FreezeRequest {
    pub user_id: AccountId,
    pub action: FreezeAction,
}

#[derive(Debug, Deserialize)]
pub struct ProcessTransactionRequest {
    pub transaction_id: TransactionId,
    pub action: Decision,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub transaction_id: TransactionId,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutUserRequest {
    pub user_id: AccountId,
}

#[derive(Debug, Deserialize)]
pub struct LoginDecisionRequest {
    pub approval_id: ApprovalId,
    pub action: LoginDecision,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApprovalStatusResponse {
    pub approval_id: ApprovalId,
    pub status: LoginApprovalStatus,
}

#[derive(Debug, Serialize)]
pub struct LogoutUserResponse {
    pub message: String,
    pub user_id: AccountId,
    pub logout_time: DateTime<Utc>,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub bank: Arc<Bank>,
}

// === Error Handling ===

/// Wrapper for converting [`BankError`] into HTTP responses.
#[derive(Debug)]
pub struct ApiError(BankError);

impl From<BankError> for ApiError {
    fn from(err: BankError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BankError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BankError::AlreadyDecided => (StatusCode::CONFLICT, "ALREADY_DECIDED"),
            BankError::InsufficientFunds => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_FUNDS")
            }
            BankError::InvalidAccountType => (StatusCode::BAD_REQUEST, "INVALID_ACCOUNT_TYPE"),
            BankError::InvalidDestination => (StatusCode::BAD_REQUEST, "INVALID_DESTINATION"),
            BankError::InvalidTransactionType => {
                (StatusCode::BAD_REQUEST, "INVALID_TRANSACTION_TYPE")
            }
            BankError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            BankError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            BankError::Revoked => (StatusCode::UNAUTHORIZED, "SESSION_REVOKED"),
            BankError::AccountFrozen => (StatusCode::FORBIDDEN, "ACCOUNT_FROZEN"),
            BankError::NotApproved => (StatusCode::FORBIDDEN, "NOT_APPROVED"),
            BankError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            BankError::NotReady => (StatusCode::CONFLICT, "NOT_READY"),
            BankError::DuplicateEmail => (StatusCode::CONFLICT, "DUPLICATE_EMAIL"),
            BankError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            BankError::Internal(detail) => {
                error!(%detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Extractors ===

/// The raw bearer token, not yet validated.
pub struct BearerToken(pub String);

impl FromRequestParts<AppState> for BearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| BearerToken(token.trim().to_string()))
            .ok_or(ApiError(BankError::InvalidToken))
    }
}

/// A caller whose bearer token passed validation.
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        Ok(Authenticated(state.bank.validate(&token)?))
    }
}

/// Runs password hashing off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, BankError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError(BankError::Internal(format!("worker failed: {e}"))))?
        .map_err(ApiError)
}

// === Handlers ===

/// POST /signup
async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AccountProfile>), ApiError> {
    let bank = state.bank.clone();
    let profile = blocking(move || bank.signup(request)).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /login
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, ApiError> {
    let bank = state.bank.clone();
    let outcome = blocking(move || bank.login(&request.email, &request.password)).await?;
    Ok(Json(outcome))
}

/// POST /logout
async fn logout(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Json<MessageResponse> {
    state.bank.logout(&principal);
    message("Logged out")
}

/// GET /dashboard
async fn dashboard(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(state.bank.dashboard(&principal)?))
}

/// POST /transfer
async fn transfer(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let transaction = state.bank.create_transaction(&principal, request)?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /transactions
async fn transactions(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Json<Vec<Transaction>> {
    Json(state.bank.transactions(&principal))
}

/// GET /check-force-logout
async fn check_force_logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<ForcedLogout>, ApiError> {
    Ok(Json(state.bank.check_forced_logout(&token)?))
}

/// GET /check-approval-status/{id}
async fn approval_status(
    State(state): State<AppState>,
    Path(id): Path<ApprovalId>,
) -> Result<Json<ApprovalStatusResponse>, ApiError> {
    let status = state.bank.login_approval_status(&id)?;
    Ok(Json(ApprovalStatusResponse {
        approval_id: id,
        status,
    }))
}

/// GET /login-approvals/{id}/token
async fn approval_token(
    State(state): State<AppState>,
    Path(id): Path<ApprovalId>,
) -> Result<Json<ApprovedLogin>, ApiError> {
    Ok(Json(state.bank.fetch_login_token(&id)?))
}

// --- admin ---

/// GET /admin/pending-users
async fn pending_users(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
) -> Result<Json<Vec<Arc<Account>>>, ApiError> {
    Ok(Json(state.bank.pending_signups(&admin)?))
}

/// POST /admin/approve-user
async fn approve_user(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Json(request): Json<SignupDecisionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    match request.action {
        SignupAction::Approve => {
            state.bank.approve_signup(&admin, &request.user_id)?;
            Ok(message("User approved successfully"))
        }
        SignupAction::Decline => {
            state.bank.decline_signup(&admin, &request.user_id)?;
            Ok(message("User declined and removed"))
        }
    }
}

/// POST /admin/freeze-user
async fn freeze_user(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Json(request): Json<FreezeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let frozen = matches!(request.action, FreezeAction::Freeze);
    state.bank.set_frozen(&admin, &request.user_id, frozen)?;
    Ok(message(if frozen {
        "User account frozen"
    } else {
        "User account unfrozen"
    }))
}

/// GET /admin/pending-transactions
async fn pending_transactions(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(state.bank.pending_transactions(&admin)?))
}

/// POST /admin/process-transaction
async fn process_transaction(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Json(request): Json<ProcessTransactionRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction = state.bank.decide_transaction(
        &admin,
        &request.transaction_id,
        request.action,
        request.admin_notes,
    )?;
    Ok(Json(transaction))
}

/// POST /admin/transaction-notes
async fn transaction_notes(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Json(request): Json<NotesRequest>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(state.bank.annotate(
        &admin,
        &request.transaction_id,
        request.admin_notes,
    )?))
}

/// POST /admin/manual-transaction
async fn manual_transaction(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Json(adjustment): Json<ManualAdjustment>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let transaction = state.bank.manual_adjust(&admin, adjustment)?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /admin/users
async fn users(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
) -> Result<Json<Vec<AccountOverview>>, ApiError> {
    Ok(Json(state.bank.accounts_overview(&admin)?))
}

/// GET /admin/active-sessions
async fn active_sessions(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
) -> Result<Json<Vec<Session>>, ApiError> {
    admin.require_admin()?;
    Ok(Json(state.bank.auth().active_sessions()))
}

/// POST /admin/logout-user
async fn logout_user(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Json(request): Json<LogoutUserRequest>,
) -> Result<Json<LogoutUserResponse>, ApiError> {
    let logout_time = state.bank.revoke(&admin, &request.user_id)?;
    Ok(Json(LogoutUserResponse {
        message: "User logged out successfully".to_string(),
        user_id: request.user_id,
        logout_time,
    }))
}

/// GET /admin/pending-login-approvals
async fn pending_login_approvals(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
) -> Result<Json<Vec<LoginApproval>>, ApiError> {
    Ok(Json(state.bank.pending_login_approvals(&admin)?))
}

/// POST /admin/approve-login
async fn approve_login(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Json(request): Json<LoginDecisionRequest>,
) -> Result<Json<LoginApproval>, ApiError> {
    Ok(Json(state.bank.decide_login(
        &admin,
        &request.approval_id,
        request.action,
    )?))
}

// === Router ===

pub fn create_router(bank: Arc<Bank>) -> Router {
    let api = Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/dashboard", get(dashboard))
        .route("/transfer", post(transfer))
        .route("/transactions", get(transactions))
        .route("/check-force-logout", get(check_force_logout))
        .route("/check-approval-status/{id}", get(approval_status))
        .route("/login-approvals/{id}/token", get(approval_token))
        .route("/admin/pending-users", get(pending_users))
        .route("/admin/approve-user", post(approve_user))
        .route("/admin/freeze-user", post(freeze_user))
        .route("/admin/pending-transactions", get(pending_transactions))
        .route("/admin/process-transaction", post(process_transaction))
        .route("/admin/transaction-notes", post(transaction_notes))
        .route("/admin/manual-transaction", post(manual_transaction))
        .route("/admin/users", get(users))
        .route("/admin/active-sessions", get(active_sessions))
        .route("/admin/logout-user", post(logout_user))
        .route("/admin/force-logout", post(logout_user))
        .route("/admin/pending-login-approvals", get(pending_login_approvals))
        .route("/admin/approve-login", post(approve_login))
        .with_state(AppState { bank });
    Router::new().nest("/api", api)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, bank: Arc<Bank>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "ledger API listening");
    }
    axum::serve(listener, create_router(bank))
        .with_graceful_shutdown(shutdown)
        .await
}
