//! HTTP surface over [`Service`].
//!
//! The caller's session travels in the `x-session-id` header. Store work is blocking,
//! so every handler runs its service call on the blocking pool.

use std::convert::Infallible;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use log::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task;
use warp::http::StatusCode;
use warp::reply::{self, Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use crate::account::{AccountStatus, AccountType, NewAccount};
use crate::bank::{self, AccrualReport, ErrorKind, Service};
use crate::types::{Id, SessionId};
use crate::user::UserChanges;

pub const SESSION_HEADER: &str = "x-session-id";

const BODY_LIMIT: u64 = 16 * 1024;

/// State shared by every route
pub struct Context {
	pub service: Arc<Service>,
	/// Monthly rate applied by the pass-time endpoint
	pub savings_rate: BigDecimal,
}

#[derive(Serialize, Debug)]
struct Message {
	message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAccountRequest {
	user_id: Id,
	#[serde(default)]
	balance: Option<BigDecimal>,
	#[serde(default)]
	status: Option<AccountStatus>,
	#[serde(rename = "type")]
	account_type: AccountType,
}

#[derive(Deserialize)]
struct AmountRequest {
	amount: BigDecimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
	target_account_id: Id,
	amount: BigDecimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PassTimeRequest {
	num_of_months: i32,
}

#[derive(Deserialize)]
struct StatusRequest {
	status: AccountStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerRequest {
	user_id: Id,
}

#[derive(Deserialize)]
struct LoginRequest {
	username: String,
	password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginReply {
	session_id: SessionId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccrualSummary {
	months: u32,
	succeeded: usize,
	failed_account_ids: Vec<Id>,
}

impl From<AccrualReport> for AccrualSummary {
	fn from(report: AccrualReport) -> Self {
		AccrualSummary {
			months: report.months,
			succeeded: report.succeeded,
			failed_account_ids: report.failed_ids(),
		}
	}
}

pub fn routes(ctx: Arc<Context>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
	let with_ctx = warp::any().map(move || ctx.clone());

	let accounts = warp::path!("accounts")
		.and(warp::get())
		.and(session())
		.and(with_ctx.clone())
		.and_then(|session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.accounts(session.as_ref()))
		});

	let open_account = warp::path!("accounts")
		.and(warp::post())
		.and(session())
		.and(json_body::<OpenAccountRequest>())
		.and(with_ctx.clone())
		.and_then(|session: Option<SessionId>, body: OpenAccountRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::CREATED, move |ctx| {
				let new_account = NewAccount {
					balance: body.balance.unwrap_or_else(|| BigDecimal::from(0)),
					status: body.status.unwrap_or(AccountStatus::Pending),
					account_type: body.account_type,
				};
				ctx.service.open_account(session.as_ref(), body.user_id, new_account)
			})
		});

	let account = warp::path!("accounts" / Id)
		.and(warp::get())
		.and(session())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.account(session.as_ref(), id))
		});

	let update_account = warp::path!("accounts" / Id)
		.and(warp::put())
		.and(session())
		.and(json_body::<StatusRequest>())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, body: StatusRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.update_account(session.as_ref(), id, body.status))
		});

	let delete_account = warp::path!("accounts" / Id)
		.and(warp::delete())
		.and(session())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| {
				ctx.service.delete_account(session.as_ref(), id)
					.map(|_| Message { message: format!("account {} deleted", id) })
			})
		});

	let by_status = warp::path!("accounts" / "status" / AccountStatus)
		.and(warp::get())
		.and(session())
		.and(with_ctx.clone())
		.and_then(|status: AccountStatus, session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.accounts_by_status(session.as_ref(), status))
		});

	let by_owner = warp::path!("accounts" / "owner" / Id)
		.and(warp::get())
		.and(session())
		.and(with_ctx.clone())
		.and_then(|user_id: Id, session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.accounts_by_owner(session.as_ref(), user_id))
		});

	let add_owner = warp::path!("accounts" / Id / "owners")
		.and(warp::post())
		.and(session())
		.and(json_body::<OwnerRequest>())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, body: OwnerRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| {
				ctx.service.add_owner(session.as_ref(), id, body.user_id)
					.map(|_| Message { message: format!("user {} now owns account {}", body.user_id, id) })
			})
		});

	let withdraw = warp::path!("accounts" / Id / "withdraw")
		.and(warp::post())
		.and(session())
		.and(json_body::<AmountRequest>())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, body: AmountRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.withdraw(session.as_ref(), id, &body.amount))
		});

	let deposit = warp::path!("accounts" / Id / "deposit")
		.and(warp::post())
		.and(session())
		.and(json_body::<AmountRequest>())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, body: AmountRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.deposit(session.as_ref(), id, &body.amount))
		});

	let transfer = warp::path!("accounts" / Id / "transfer")
		.and(warp::post())
		.and(session())
		.and(json_body::<TransferRequest>())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, body: TransferRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| {
				ctx.service.transfer(session.as_ref(), id, body.target_account_id, &body.amount)
			})
		});

	let pass_time = warp::path!("accounts" / "pass-time")
		.and(warp::post())
		.and(session())
		.and(json_body::<PassTimeRequest>())
		.and(with_ctx.clone())
		.and_then(|session: Option<SessionId>, body: PassTimeRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| {
				ctx.service.pass_time(session.as_ref(), body.num_of_months, &ctx.savings_rate)
					.map(AccrualSummary::from)
			})
		});

	let login = warp::path!("login")
		.and(warp::post())
		.and(json_body::<LoginRequest>())
		.and(with_ctx.clone())
		.and_then(|body: LoginRequest, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| {
				ctx.service.login(&body.username, &body.password)
					.map(|session_id| LoginReply { session_id })
			})
		});

	let update_user = warp::path!("users" / Id)
		.and(warp::put())
		.and(session())
		.and(json_body::<UserChanges>())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, changes: UserChanges, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.update_user(session.as_ref(), id, &changes))
		});

	let users = warp::path!("users")
		.and(warp::get())
		.and(session())
		.and(with_ctx.clone())
		.and_then(|session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.users(session.as_ref()))
		});

	let user = warp::path!("users" / Id)
		.and(warp::get())
		.and(session())
		.and(with_ctx.clone())
		.and_then(|id: Id, session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| ctx.service.user(session.as_ref(), id))
		});

	let logout = warp::path!("logout")
		.and(warp::post())
		.and(session())
		.and(with_ctx)
		.and_then(|session: Option<SessionId>, ctx: Arc<Context>| {
			respond(ctx, StatusCode::OK, move |ctx| {
				ctx.service.logout(session.as_ref())
					.map(|_| Message { message: "logged out".to_string() })
			})
		});

	accounts
		.or(open_account)
		.or(pass_time)
		.or(by_status)
		.or(by_owner)
		.or(account)
		.or(update_account)
		.or(delete_account)
		.or(add_owner)
		.or(withdraw)
		.or(deposit)
		.or(transfer)
		.or(login)
		.or(users)
		.or(user)
		.or(update_user)
		.or(logout)
		.recover(recover)
}

fn session() -> impl Filter<Extract = (Option<SessionId>,), Error = Rejection> + Clone {
	warp::header::optional::<SessionId>(SESSION_HEADER)
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
	warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

async fn respond<T, F>(ctx: Arc<Context>, status: StatusCode, op: F) -> Result<WithStatus<Json>, Infallible>
	where F: FnOnce(&Context) -> bank::Result<T> + Send + 'static,
		  T: Serialize + Send + 'static,
{
	let reply = match task::spawn_blocking(move || op(&ctx)).await {
		Ok(Ok(body)) => reply::with_status(reply::json(&body), status),
		Ok(Err(e)) => error_reply(&e),
		Err(e) => {
			error!(target: "bank::api", "handler did not complete: {}", e);
			message(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
		}
	};
	Ok(reply)
}

pub fn status_of(kind: &ErrorKind) -> StatusCode {
	match kind {
		ErrorKind::NotAuthenticated => StatusCode::UNAUTHORIZED,
		ErrorKind::NotAuthorized => StatusCode::FORBIDDEN,
		ErrorKind::InvalidCredentials | ErrorKind::IllegalAmount(_) => StatusCode::BAD_REQUEST,
		ErrorKind::AccountNotFound(_) | ErrorKind::UserNotFound(_) => StatusCode::NOT_FOUND,
		ErrorKind::AccountNotEligible(..) | ErrorKind::UserAlreadyExists => StatusCode::CONFLICT,
		ErrorKind::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
	}
}

fn error_reply(e: &bank::Error) -> WithStatus<Json> {
	if e.is_transient() {
		warn!(target: "bank::api", "{}", e);
		// store details stay in the log
		return message(StatusCode::SERVICE_UNAVAILABLE, "service temporarily unavailable, try again");
	}
	message(status_of(e.kind()), &e.to_string())
}

fn message(status: StatusCode, text: &str) -> WithStatus<Json> {
	reply::with_status(reply::json(&Message { message: text.to_string() }), status)
}

async fn recover(err: Rejection) -> Result<WithStatus<Json>, Infallible> {
	let reply = if err.is_not_found() {
		message(StatusCode::NOT_FOUND, "resource not found")
	} else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
		message(StatusCode::BAD_REQUEST, &e.to_string())
	} else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
		message(StatusCode::BAD_REQUEST, &e.to_string())
	} else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
		message(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
	} else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
		message(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
	} else {
		error!(target: "bank::api", "unhandled rejection: {:?}", err);
		message(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
	};
	Ok(reply)
}
