//! Persistence seams consumed by the policy and the transaction engine.
//!
//! `account::Repo` and `user::Repo` implement these against PostgreSQL;
//! [`memory::MemoryStore`] implements both in-process.

use std::collections::HashSet;

use crate::account::{Account, AccountStatus, AccountType, NewAccount};
use crate::bank::error::Error;
use crate::db;
use crate::types::Id;
use crate::user::{NewUser, User, UserChanges};

pub mod memory;

pub trait AccountStore: Send + Sync {
	fn find_account(&self, id: Id) -> db::Result<Option<Account>>;

	fn find_accounts(&self) -> db::Result<Vec<Account>>;

	fn find_accounts_by_status(&self, status: AccountStatus) -> db::Result<Vec<Account>>;

	fn find_accounts_by_type(&self, account_type: AccountType) -> db::Result<Vec<Account>>;

	fn find_accounts_by_owner(&self, user_id: Id) -> db::Result<Vec<Account>>;

	/// Ids of every user linked to the account; empty when the account has no owners
	/// or does not exist
	fn list_owners(&self, account_id: Id) -> db::Result<HashSet<Id>>;

	/// Insert the account and link it to its first owner as one unit
	fn create_account(&self, owner_id: Id, new_account: &NewAccount) -> db::Result<Account>;

	/// Link another owner to an account; linking an existing owner is a no-op
	///
	/// False when the account does not exist, including when it was deleted while the
	/// link was being made.
	fn add_owner(&self, account_id: Id, user_id: Id) -> db::Result<bool>;

	/// `None` when no such account exists
	fn set_status(&self, id: Id, status: AccountStatus) -> db::Result<Option<Account>>;

	/// Remove the account and its ownership links; false when nothing matched
	fn delete_account(&self, id: Id) -> db::Result<bool>;

	/// Atomic read-modify-write over one or more accounts
	///
	/// Every account in `ids` is locked (ascending id order) and read fresh, `apply`
	/// receives them in the order requested and may change their balances, and the new
	/// balances are written back. If any account is missing, `apply` fails, or the
	/// store fails part way, nothing is written. Returns the accounts as written.
	fn update_balances(
		&self,
		ids: &[Id],
		apply: &mut dyn FnMut(&mut [Account]) -> Result<(), Error>,
	) -> Result<Vec<Account>, Error>;
}

pub trait UserStore: Send + Sync {
	fn find_user(&self, id: Id) -> db::Result<Option<User>>;

	fn find_users(&self) -> db::Result<Vec<User>>;

	/// Insert the user together with its login
	///
	/// Fails with `RecordAlreadyExists` when the username or email is taken.
	fn create_user(&self, new_user: &NewUser, password_hash: &str) -> db::Result<User>;

	/// `None` when no such user exists; `RecordAlreadyExists` when a changed username
	/// or email belongs to someone else
	fn update_user(&self, id: Id, changes: &UserChanges) -> db::Result<Option<User>>;
}
