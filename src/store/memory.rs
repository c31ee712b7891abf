//! In-process store for embedded deployments and tests.
//!
//! Each account sits behind its own mutex, so balance updates on different accounts
//! proceed in parallel while updates on the same account are serialized. Faults can
//! be injected to exercise the engine's failure handling.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicI32, Ordering};

use dashmap::DashMap;
use log::*;

use crate::account::{Account, AccountStatus, AccountType, NewAccount};
use crate::auth::{Authenticator, Principal};
use crate::bank::error::{Error, ErrorKind};
use crate::db;
use crate::password;
use crate::store::{AccountStore, UserStore};
use crate::types::Id;
use crate::user::{self, NewUser, User, UserChanges};

#[derive(Default, Debug)]
struct Faults {
	/// Number of upcoming balance updates that fail before reading anything
	unavailable: u32,
	/// Accounts whose balance updates always fail
	broken_accounts: HashSet<Id>,
	/// Fail the next balance update after this many rows were written
	interrupt_after: Option<usize>,
}

pub struct MemoryStore {
	accounts: DashMap<Id, Arc<Mutex<Account>>>,
	/// account id -> owning user ids
	owners: DashMap<Id, HashSet<Id>>,
	users: DashMap<Id, User>,
	/// user id -> password hash
	credentials: DashMap<Id, String>,
	/// held while a username or email is checked and claimed
	user_writes: Mutex<()>,
	next_account_id: AtomicI32,
	next_user_id: AtomicI32,
	faults: Mutex<Faults>,
}

impl MemoryStore {
	pub fn new() -> Self {
		MemoryStore {
			accounts: DashMap::new(),
			owners: DashMap::new(),
			users: DashMap::new(),
			credentials: DashMap::new(),
			user_writes: Mutex::new(()),
			next_account_id: AtomicI32::new(1),
			next_user_id: AtomicI32::new(1),
			faults: Mutex::new(Faults::default()),
		}
	}

	pub fn insert_user(&self, new_user: &NewUser) -> User {
		let user = User {
			id: self.next_user_id.fetch_add(1, Ordering::SeqCst),
			username: new_user.username.to_string(),
			first_name: new_user.first_name.to_string(),
			last_name: new_user.last_name.to_string(),
			email: new_user.email.to_string(),
			role: new_user.role,
		};
		self.users.insert(user.id, user.clone());
		user
	}

	/// Give an existing user a login
	pub fn set_password(&self, user_id: Id, password: &str) -> Result<(), password::Error> {
		let hash = password::hash(password)?;
		self.credentials.insert(user_id, hash);
		Ok(())
	}

	/// Whether a user other than `except` already uses the username or email
	fn identity_taken(&self, username: Option<&str>, email: Option<&str>, except: Option<Id>) -> bool {
		self.users.iter()
			.filter(|entry| Some(*entry.key()) != except)
			.any(|entry| {
				let other = entry.value();
				username.map_or(false, |u| other.username == u) || email.map_or(false, |e| other.email == e)
			})
	}

	/// Make the next `times` balance updates fail with a transient error
	pub fn fail_updates(&self, times: u32) {
		self.faults().unavailable = times;
	}

	/// Make every balance update touching `account_id` fail with a transient error
	pub fn break_account(&self, account_id: Id) {
		self.faults().broken_accounts.insert(account_id);
	}

	/// Interrupt the next balance update after `rows` accounts were written
	pub fn interrupt_write_after(&self, rows: usize) {
		self.faults().interrupt_after = Some(rows);
	}

	fn faults(&self) -> MutexGuard<'_, Faults> {
		self.faults.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn cell(&self, id: Id) -> Option<Arc<Mutex<Account>>> {
		self.accounts.get(&id).map(|entry| Arc::clone(entry.value()))
	}

	fn snapshot<F>(&self, keep: F) -> Vec<Account>
		where F: Fn(&Account) -> bool
	{
		// clone the cells out first; no map guard may be held while waiting on an account
		let cells: Vec<Arc<Mutex<Account>>> = self.accounts.iter()
			.map(|entry| Arc::clone(entry.value()))
			.collect();

		let mut accounts: Vec<Account> = cells.iter()
			.map(|cell| lock(cell).clone())
			.filter(|account| keep(account))
			.collect();
		accounts.sort_by_key(|account| account.id);
		accounts
	}

	fn check_faults(&self, ids: &[Id]) -> Result<(), Error> {
		let mut faults = self.faults();
		if faults.unavailable > 0 {
			faults.unavailable -= 1;
			return Err(unavailable("store unavailable"));
		}
		if let Some(id) = ids.iter().find(|id| faults.broken_accounts.contains(*id)) {
			return Err(unavailable(&format!("account {} unreadable", id)));
		}
		Ok(())
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

fn lock(cell: &Mutex<Account>) -> MutexGuard<'_, Account> {
	cell.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable(reason: &str) -> Error {
	Error::from(db::Error::Connection(reason.to_string()))
}

impl AccountStore for MemoryStore {
	fn find_account(&self, id: Id) -> db::Result<Option<Account>> {
		Ok(self.cell(id).map(|cell| lock(&cell).clone()))
	}

	fn find_accounts(&self) -> db::Result<Vec<Account>> {
		Ok(self.snapshot(|_| true))
	}

	fn find_accounts_by_status(&self, status: AccountStatus) -> db::Result<Vec<Account>> {
		Ok(self.snapshot(|account| account.status == status))
	}

	fn find_accounts_by_type(&self, account_type: AccountType) -> db::Result<Vec<Account>> {
		Ok(self.snapshot(|account| account.account_type == account_type))
	}

	fn find_accounts_by_owner(&self, user_id: Id) -> db::Result<Vec<Account>> {
		let owned: HashSet<Id> = self.owners.iter()
			.filter(|entry| entry.value().contains(&user_id))
			.map(|entry| *entry.key())
			.collect();
		Ok(self.snapshot(|account| owned.contains(&account.id)))
	}

	fn list_owners(&self, account_id: Id) -> db::Result<HashSet<Id>> {
		Ok(self.owners.get(&account_id)
			.map(|owners| owners.value().clone())
			.unwrap_or_default())
	}

	fn create_account(&self, owner_id: Id, new_account: &NewAccount) -> db::Result<Account> {
		let account = Account {
			id: self.next_account_id.fetch_add(1, Ordering::SeqCst),
			balance: new_account.balance.clone(),
			status: new_account.status,
			account_type: new_account.account_type,
		};
		self.owners.entry(account.id).or_default().insert(owner_id);
		self.accounts.insert(account.id, Arc::new(Mutex::new(account.clone())));
		Ok(account)
	}

	fn add_owner(&self, account_id: Id, user_id: Id) -> db::Result<bool> {
		let cell = match self.cell(account_id) {
			Some(cell) => cell,
			None => return Ok(false),
		};
		// delete_account removes the links under the same lock
		let _account = lock(&cell);
		if !self.accounts.contains_key(&account_id) {
			return Ok(false);
		}
		self.owners.entry(account_id).or_default().insert(user_id);
		Ok(true)
	}

	fn set_status(&self, id: Id, status: AccountStatus) -> db::Result<Option<Account>> {
		let cell = match self.cell(id) {
			Some(cell) => cell,
			None => return Ok(None),
		};
		let mut account = lock(&cell);
		if !self.accounts.contains_key(&id) {
			return Ok(None);
		}
		account.status = status;
		Ok(Some(account.clone()))
	}

	fn delete_account(&self, id: Id) -> db::Result<bool> {
		let cell = match self.cell(id) {
			Some(cell) => cell,
			None => return Ok(false),
		};
		// wait for any in-flight update on the account before it disappears
		let _account = lock(&cell);
		let removed = self.accounts.remove(&id).is_some();
		self.owners.remove(&id);
		Ok(removed)
	}

	fn update_balances(
		&self,
		ids: &[Id],
		apply: &mut dyn FnMut(&mut [Account]) -> Result<(), Error>,
	) -> Result<Vec<Account>, Error> {
		let mut lock_order = ids.to_vec();
		lock_order.sort_unstable();
		lock_order.dedup();

		let cells = lock_order.iter()
			.map(|&id| self.cell(id).ok_or_else(|| Error::new(ErrorKind::AccountNotFound(id))))
			.collect::<Result<Vec<_>, _>>()?;
		let mut guards: Vec<MutexGuard<'_, Account>> = cells.iter().map(|cell| lock(cell)).collect();

		// deleted while this update waited for its locks
		if let Some(&id) = lock_order.iter().find(|id| !self.accounts.contains_key(*id)) {
			return Err(Error::new(ErrorKind::AccountNotFound(id)));
		}
		self.check_faults(&lock_order)?;

		let mut working: Vec<Account> = Vec::with_capacity(ids.len());
		for id in ids {
			if let Some(guard) = guards.iter().find(|guard| guard.id == *id) {
				working.push((**guard).clone());
			}
		}

		apply(&mut working)?;

		let before: Vec<Account> = guards.iter().map(|guard| (**guard).clone()).collect();
		let interrupt_after = self.faults().interrupt_after.take();
		let mut written = 0;
		for guard in guards.iter_mut() {
			if interrupt_after == Some(written) {
				break;
			}
			if let Some(updated) = working.iter().find(|account| account.id == guard.id) {
				guard.balance = updated.balance.clone();
			}
			written += 1;
		}

		if written < guards.len() {
			warn!(target: "bank::store", "balance write interrupted after {} of {} rows, rolling back", written, guards.len());
			for (guard, previous) in guards.iter_mut().zip(before.iter()).take(written) {
				guard.balance = previous.balance.clone();
			}
			return Err(unavailable("balance write interrupted"));
		}

		Ok(working)
	}
}

impl UserStore for MemoryStore {
	fn find_user(&self, id: Id) -> db::Result<Option<User>> {
		Ok(self.users.get(&id).map(|user| user.value().clone()))
	}

	fn find_users(&self) -> db::Result<Vec<User>> {
		let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
		users.sort_by_key(|user| user.id);
		Ok(users)
	}

	fn create_user(&self, new_user: &NewUser, password_hash: &str) -> db::Result<User> {
		let _writes = self.user_writes.lock().unwrap_or_else(PoisonError::into_inner);
		if self.identity_taken(Some(new_user.username), Some(new_user.email), None) {
			return Err(db::Error::RecordAlreadyExists);
		}
		let user = self.insert_user(new_user);
		self.credentials.insert(user.id, password_hash.to_string());
		Ok(user)
	}

	fn update_user(&self, id: Id, changes: &UserChanges) -> db::Result<Option<User>> {
		let _writes = self.user_writes.lock().unwrap_or_else(PoisonError::into_inner);
		if self.identity_taken(changes.username.as_deref(), changes.email.as_deref(), Some(id)) {
			return Err(db::Error::RecordAlreadyExists);
		}
		Ok(self.users.get_mut(&id).map(|mut user| {
			changes.apply(user.value_mut());
			user.value().clone()
		}))
	}
}

impl Authenticator for MemoryStore {
	fn authenticate(&self, username: &str, password: &str) -> db::Result<Option<Principal>> {
		let found = self.users.iter()
			.find(|entry| entry.value().username == username)
			.map(|entry| (entry.value().id, entry.value().role))
			.and_then(|(id, role)| self.credentials.get(&id).map(|hash| (id, role, hash.value().clone())));
		Ok(user::check_password(found, password))
	}
}

#[cfg(test)]
mod tests {
	use bigdecimal::BigDecimal;

	use super::*;

	fn open_checking(store: &MemoryStore, owner: Id, balance: i32) -> Account {
		store.create_account(owner, &NewAccount {
			balance: BigDecimal::from(balance),
			status: AccountStatus::Open,
			account_type: AccountType::Checking,
		}).unwrap()
	}

	#[test]
	fn create_links_first_owner() {
		let store = MemoryStore::new();
		let account = open_checking(&store, 5, 0);
		assert!(store.add_owner(account.id, 9).unwrap());

		let owners = store.list_owners(account.id).unwrap();
		assert_eq!(owners, [5, 9].iter().cloned().collect::<HashSet<Id>>());
		assert_eq!(store.find_accounts_by_owner(9).unwrap(), vec![account]);
	}

	#[test]
	fn update_returns_accounts_in_requested_order() {
		let store = MemoryStore::new();
		let low = open_checking(&store, 1, 10);
		let high = open_checking(&store, 1, 20);

		let got = store.update_balances(&[high.id, low.id], &mut |accounts| {
			accounts[0].balance = BigDecimal::from(0);
			Ok(())
		}).unwrap();

		assert_eq!(got[0].id, high.id);
		assert_eq!(store.find_account(high.id).unwrap().unwrap().balance, BigDecimal::from(0));
		assert_eq!(store.find_account(low.id).unwrap().unwrap().balance, BigDecimal::from(10));
	}

	#[test]
	fn failed_apply_writes_nothing() {
		let store = MemoryStore::new();
		let account = open_checking(&store, 1, 10);

		let err = store.update_balances(&[account.id], &mut |accounts| {
			accounts[0].balance = BigDecimal::from(99);
			Err(Error::illegal_amount("nope"))
		}).unwrap_err();

		assert!(matches!(err.kind(), ErrorKind::IllegalAmount(_)));
		assert_eq!(store.find_account(account.id).unwrap().unwrap().balance, BigDecimal::from(10));
	}

	#[test]
	fn interrupted_write_rolls_back_written_rows() {
		let store = MemoryStore::new();
		let a = open_checking(&store, 1, 10);
		let b = open_checking(&store, 1, 20);
		store.interrupt_write_after(1);

		let err = store.update_balances(&[a.id, b.id], &mut |accounts| {
			accounts[0].balance = BigDecimal::from(0);
			accounts[1].balance = BigDecimal::from(30);
			Ok(())
		}).unwrap_err();

		assert!(err.is_transient());
		assert_eq!(store.find_account(a.id).unwrap().unwrap().balance, BigDecimal::from(10));
		assert_eq!(store.find_account(b.id).unwrap().unwrap().balance, BigDecimal::from(20));
	}

	#[test]
	fn missing_account_is_not_found() {
		let store = MemoryStore::new();
		let err = store.update_balances(&[42], &mut |_| Ok(())).unwrap_err();
		assert_eq!(err.kind(), &ErrorKind::AccountNotFound(42));
	}

	#[test]
	fn deleted_account_disappears_with_its_links() {
		let store = MemoryStore::new();
		let account = open_checking(&store, 3, 0);

		assert!(store.delete_account(account.id).unwrap());
		assert!(!store.delete_account(account.id).unwrap());
		assert_eq!(store.find_account(account.id).unwrap(), None);
		assert!(store.list_owners(account.id).unwrap().is_empty());
	}

	#[test]
	fn owner_of_missing_account_is_not_linked() {
		let store = MemoryStore::new();
		let account = open_checking(&store, 3, 0);
		store.delete_account(account.id).unwrap();

		assert!(!store.add_owner(account.id, 9).unwrap());
		assert!(!store.add_owner(404, 9).unwrap());
		assert!(store.list_owners(account.id).unwrap().is_empty());
		assert!(store.find_accounts_by_owner(9).unwrap().is_empty());
	}

	#[test]
	fn usernames_and_emails_stay_unique() {
		let store = MemoryStore::new();
		let bob = NewUser {
			username: "bob",
			first_name: "Bob",
			last_name: "Roberts",
			email: "bob@gmail.com",
			role: crate::user::Role::Customer,
		};
		let created = store.create_user(&bob, "hash").unwrap();

		let err = store.create_user(&NewUser { email: "other@gmail.com", ..bob }, "hash").unwrap_err();
		assert_eq!(err, db::Error::RecordAlreadyExists);

		let lucy = store.create_user(&NewUser { username: "lucy", email: "lucy@gmail.com", ..bob }, "hash").unwrap();
		let steal = UserChanges { email: Some("bob@gmail.com".to_string()), ..UserChanges::default() };
		assert_eq!(store.update_user(lucy.id, &steal).unwrap_err(), db::Error::RecordAlreadyExists);

		// keeping your own email is not a conflict
		let same = UserChanges { email: Some("bob@gmail.com".to_string()), first_name: Some("Robert".to_string()), ..UserChanges::default() };
		let updated = store.update_user(created.id, &same).unwrap().unwrap();
		assert_eq!(updated.first_name, "Robert");
		assert_eq!(store.update_user(404, &same).unwrap(), None);
	}
}
