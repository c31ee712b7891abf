use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use log::*;

use crate::account::{Account, AccountStatus, NewAccount};
use crate::auth::{Authenticator, Policy, Principal};
use crate::db;
use crate::session::Registry;
use crate::store::{AccountStore, UserStore};
use crate::types::{Id, SessionId};
use crate::user::{Role, User, UserChanges};

use super::engine::{AccrualReport, Engine, Transfer};
use super::error::{Error, ErrorKind};
use super::Result;

const STAFF: &[Role] = &[Role::Employee, Role::Admin];
const ADMIN: &[Role] = &[Role::Admin];

/// Service for performing guarded banking operations
///
/// Each operation resolves the caller's session, applies its guard and then delegates
/// to the store or the transaction engine. Built once and shared between requests.
pub struct Service {
	policy: Policy,
	engine: Engine,
	accounts: Arc<dyn AccountStore>,
	users: Arc<dyn UserStore>,
	authenticator: Arc<dyn Authenticator>,
	sessions: Arc<Registry>,
}

/// Parameter object for creating a new Service
pub struct NewService {
	pub accounts: Arc<dyn AccountStore>,
	pub users: Arc<dyn UserStore>,
	/// Checks the credentials presented at login
	pub authenticator: Arc<dyn Authenticator>,
	pub sessions: Arc<Registry>,
	/// Extra attempts for single-account movements on transient store failures
	pub retries: u32,
}

impl Service {
	pub fn new(v: NewService) -> Self {
		Service {
			policy: Policy::new(v.sessions.clone(), v.accounts.clone()),
			engine: Engine::new(v.accounts.clone(), v.retries),
			accounts: v.accounts,
			users: v.users,
			authenticator: v.authenticator,
			sessions: v.sessions,
		}
	}

	/// Open a session for the user the credentials belong to
	///
	/// The returned handle is presented on every later request.
	pub fn login(&self, username: &str, password: &str) -> Result<SessionId> {
		match self.authenticator.authenticate(username, password)? {
			Some(principal) => {
				let session = self.sessions.open(principal);
				info!(target: "bank::auth", "user {} logged in as {}", principal.user_id, principal.role);
				Ok(session)
			}
			None => {
				info!(target: "bank::auth", "rejected login for {:?}", username);
				Err(Error::new(ErrorKind::InvalidCredentials))
			}
		}
	}

	/// The principal behind a session, if any
	pub fn whoami(&self, session: Option<&SessionId>) -> Result<Principal> {
		self.policy.require_logged_in(session)
	}

	/// Close the caller's session
	pub fn logout(&self, session: Option<&SessionId>) -> Result<()> {
		let principal = self.policy.require_logged_in(session)?;
		if let Some(id) = session {
			self.sessions.close(id);
		}
		info!(target: "bank::auth", "user {} logged out", principal.user_id);
		Ok(())
	}

	pub fn account(&self, session: Option<&SessionId>, id: Id) -> Result<Account> {
		self.policy.require_account_owner_or_role(session, id, STAFF)?;
		self.accounts.find_account(id)?
			.ok_or_else(|| Error::new(ErrorKind::AccountNotFound(id)))
	}

	pub fn accounts(&self, session: Option<&SessionId>) -> Result<Vec<Account>> {
		self.policy.require_role(session, STAFF)?;
		self.accounts.find_accounts().map_err(Into::into)
	}

	pub fn accounts_by_status(&self, session: Option<&SessionId>, status: AccountStatus) -> Result<Vec<Account>> {
		self.policy.require_role(session, STAFF)?;
		self.accounts.find_accounts_by_status(status).map_err(Into::into)
	}

	pub fn accounts_by_owner(&self, session: Option<&SessionId>, user_id: Id) -> Result<Vec<Account>> {
		self.policy.require_owner_or_role(session, user_id, STAFF)?;
		self.accounts.find_accounts_by_owner(user_id).map_err(Into::into)
	}

	/// Open an account owned by `user_id`
	///
	/// Customers may only apply: their accounts start out `Pending` whatever status was
	/// requested. Staff open accounts with the requested status.
	///
	/// # Arguments
	/// * `user_id` - first owner of the account, must exist
	/// * `new_account` - opening balance, status and type
	pub fn open_account(&self, session: Option<&SessionId>, user_id: Id, mut new_account: NewAccount) -> Result<Account> {
		let principal = self.policy.require_owner_or_role(session, user_id, STAFF)?;
		if new_account.balance < BigDecimal::zero() {
			return Err(Error::illegal_amount("opening balance must not be negative"));
		}
		if self.users.find_user(user_id)?.is_none() {
			return Err(Error::new(ErrorKind::UserNotFound(user_id)));
		}
		if !principal.has_role(STAFF) {
			new_account.status = AccountStatus::Pending;
		}

		let account = self.accounts.create_account(user_id, &new_account)?;
		info!(target: "bank::engine", "user {} opened {} account {} for user {}",
			  principal.user_id, account.account_type, account.id, user_id);
		Ok(account)
	}

	/// Administrative status change: approve, deny or close an account
	pub fn update_account(&self, session: Option<&SessionId>, id: Id, status: AccountStatus) -> Result<Account> {
		let principal = self.policy.require_role(session, ADMIN)?;
		let account = self.accounts.set_status(id, status)?
			.ok_or_else(|| Error::new(ErrorKind::AccountNotFound(id)))?;
		info!(target: "bank::engine", "user {} set account {} to {}", principal.user_id, id, status);
		Ok(account)
	}

	pub fn delete_account(&self, session: Option<&SessionId>, id: Id) -> Result<()> {
		let principal = self.policy.require_role(session, ADMIN)?;
		if !self.accounts.delete_account(id)? {
			return Err(Error::new(ErrorKind::AccountNotFound(id)));
		}
		info!(target: "bank::engine", "user {} deleted account {}", principal.user_id, id);
		Ok(())
	}

	/// Link another owner to an existing account, making it a joint account
	pub fn add_owner(&self, session: Option<&SessionId>, account_id: Id, user_id: Id) -> Result<()> {
		let principal = self.policy.require_role(session, STAFF)?;
		if self.accounts.find_account(account_id)?.is_none() {
			return Err(Error::new(ErrorKind::AccountNotFound(account_id)));
		}
		if self.users.find_user(user_id)?.is_none() {
			return Err(Error::new(ErrorKind::UserNotFound(user_id)));
		}

		// the account may have been deleted since it was looked up
		if !self.accounts.add_owner(account_id, user_id)? {
			return Err(Error::new(ErrorKind::AccountNotFound(account_id)));
		}
		info!(target: "bank::engine", "user {} added user {} as owner of account {}", principal.user_id, user_id, account_id);
		Ok(())
	}

	/// Withdraw funds from an account the caller owns
	///
	/// # Arguments
	/// * `account_id` - account the funds are taken from
	/// * `amount` - amount withdrawn
	pub fn withdraw(&self, session: Option<&SessionId>, account_id: Id, amount: &BigDecimal) -> Result<Account> {
		let principal = self.policy.require_account_owner_or_role(session, account_id, ADMIN)?;
		self.engine.withdraw(&principal, account_id, amount)
	}

	/// Deposit funds to an account the caller owns
	///
	/// # Arguments
	/// * `account_id` - account receiving the funds
	/// * `amount` - amount deposited
	pub fn deposit(&self, session: Option<&SessionId>, account_id: Id, amount: &BigDecimal) -> Result<Account> {
		let principal = self.policy.require_account_owner_or_role(session, account_id, ADMIN)?;
		self.engine.deposit(&principal, account_id, amount)
	}

	/// Transfer funds out of an account the caller owns into any open account
	///
	/// # Arguments
	/// * `source_id` - account debited, must be owned by the caller unless they are an admin
	/// * `target_id` - account credited
	/// * `amount` - amount transferred
	pub fn transfer(&self, session: Option<&SessionId>, source_id: Id, target_id: Id, amount: &BigDecimal) -> Result<Transfer> {
		let principal = self.policy.require_account_owner_or_role(session, source_id, ADMIN)?;
		self.engine.transfer(&principal, source_id, target_id, amount)
	}

	/// Accrue `months` of monthly compound interest on every savings account
	pub fn pass_time(&self, session: Option<&SessionId>, months: i32, rate: &BigDecimal) -> Result<AccrualReport> {
		let principal = self.policy.require_role(session, ADMIN)?;
		self.engine.accrue_interest(&principal, months, rate)
	}

	pub fn user(&self, session: Option<&SessionId>, id: Id) -> Result<User> {
		self.policy.require_owner_or_role(session, id, STAFF)?;
		self.users.find_user(id)?
			.ok_or_else(|| Error::new(ErrorKind::UserNotFound(id)))
	}

	pub fn users(&self, session: Option<&SessionId>) -> Result<Vec<User>> {
		self.policy.require_role(session, STAFF)?;
		self.users.find_users().map_err(Into::into)
	}

	/// Change a user's profile
	///
	/// Users may edit their own profile; only an admin may edit someone else's or
	/// change any user's role.
	pub fn update_user(&self, session: Option<&SessionId>, id: Id, changes: &UserChanges) -> Result<User> {
		let principal = self.policy.require_owner_or_role(session, id, ADMIN)?;
		if changes.role.is_some() && !principal.has_role(ADMIN) {
			return Err(Error::new(ErrorKind::NotAuthorized));
		}

		let user = self.users.update_user(id, changes)
			.map_err(user_conflict)?
			.ok_or_else(|| Error::new(ErrorKind::UserNotFound(id)))?;
		if changes.role.is_some() {
			self.sessions.set_role(id, user.role);
		}
		info!(target: "bank::auth", "user {} updated user {}", principal.user_id, id);
		Ok(user)
	}
}

fn user_conflict(e: db::Error) -> Error {
	match e {
		db::Error::RecordAlreadyExists => Error::new(ErrorKind::UserAlreadyExists),
		e => e.into(),
	}
}
