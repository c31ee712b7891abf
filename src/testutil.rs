use std::sync::Arc;

pub use bigdecimal::BigDecimal;

use crate::account::{Account, AccountStatus, AccountType, NewAccount};
use crate::auth::Principal;
use crate::bank::{NewService, Service};
use crate::session::Registry;
use crate::store::AccountStore;
use crate::store::memory::MemoryStore;
use crate::types::{Id, SessionId};
use crate::user::{NewUser, Role, User};

pub struct Fixture {
	pub store: Arc<MemoryStore>,
	pub sessions: Arc<Registry>,
	pub user_factory: UserFactory,
	pub account_factory: AccountFactory,
}

impl Fixture {
	pub fn new() -> Self {
		let store = Arc::new(MemoryStore::new());
		Fixture {
			sessions: Arc::new(Registry::new()),
			user_factory: UserFactory::new(store.clone()),
			account_factory: AccountFactory::new(store.clone()),
			store,
		}
	}

	pub fn service(&self) -> Service {
		Service::new(NewService {
			accounts: self.store.clone(),
			users: self.store.clone(),
			authenticator: self.store.clone(),
			sessions: self.sessions.clone(),
			retries: 2,
		})
	}

	pub fn login(&self, user: &User) -> SessionId {
		self.sessions.open(Principal::new(user.id, user.role))
	}

	pub fn balance(&self, account_id: Id) -> BigDecimal {
		self.store.find_account(account_id).unwrap().unwrap().balance
	}
}

pub struct UserFactory {
	store: Arc<MemoryStore>,
}

impl<'a> UserFactory {
	fn new(store: Arc<MemoryStore>) -> Self {
		UserFactory { store }
	}

	pub fn defaults() -> NewUser<'a> {
		NewUser {
			username: "default",
			first_name: "Default",
			last_name: "Default",
			email: "default@gmail.com",
			role: Role::Customer,
		}
	}

	pub fn user(&self, new_user: NewUser) -> User {
		self.store.insert_user(&new_user)
	}

	pub fn bob(&self) -> User {
		self.user(NewUser {
			username: "bob",
			first_name: "Bob",
			last_name: "Roberts",
			email: "bob@gmail.com",
			..UserFactory::defaults()
		})
	}

	pub fn lucy(&self) -> User {
		self.user(NewUser {
			username: "lucy",
			first_name: "Lucy",
			last_name: "Luke",
			email: "lucy@gmail.com",
			..UserFactory::defaults()
		})
	}

	pub fn admin(&self) -> User {
		self.user(NewUser {
			username: "ada",
			first_name: "Ada",
			email: "ada@bank.com",
			role: Role::Admin,
			..UserFactory::defaults()
		})
	}
}

pub struct AccountFactory {
	store: Arc<MemoryStore>,
}

impl AccountFactory {
	pub fn new(store: Arc<MemoryStore>) -> Self {
		AccountFactory { store }
	}

	pub fn account(&self, owner_id: Id, account_type: AccountType, status: AccountStatus, balance: i32) -> Account {
		self.store.create_account(owner_id, &NewAccount {
			balance: BigDecimal::from(balance),
			status,
			account_type,
		}).unwrap()
	}

	pub fn checking(&self, owner_id: Id, balance: i32) -> Account {
		self.account(owner_id, AccountType::Checking, AccountStatus::Open, balance)
	}

	pub fn savings(&self, owner_id: Id, balance: i32) -> Account {
		self.account(owner_id, AccountType::Savings, AccountStatus::Open, balance)
	}
}
