use std::sync::{Mutex, MutexGuard, PoisonError};

pub use bigdecimal::BigDecimal;
pub use diesel::prelude::*;

pub use bank_engine::*;
pub use bank_engine::db::PgPool;

// every suite wipes the same tables
static SERIAL: Mutex<()> = Mutex::new(());

pub struct Suite {
	pub pool: PgPool,
	pub user_repo: user::Repo,
	pub account_repo: account::Repo,
	_serial: MutexGuard<'static, ()>,
}

impl Suite {
	pub fn setup() -> Self {
		let serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
		let config = Config::from_env().expect("reading configuration");
		let pool = db::pg_connection(&config).expect("connecting to DATABASE_URL");
		Suite::teardown(&pool);

		Suite {
			user_repo: user::Repo::new(pool.clone()),
			account_repo: account::Repo::new(pool.clone()),
			pool,
			_serial: serial,
		}
	}

	fn teardown(pool: &PgPool) {
		let conn = pool.get().unwrap();
		let tables = vec!["users_accounts", "accounts", "credentials", "users"];
		println!("\n--- clean up ---");
		for table in tables {
			diesel::sql_query(format!("DELETE FROM {}", table))
				.execute(&conn)
				.map(|n| println!("deleting {} from '{}' table", n, table))
				.expect("deleting db table");
		}
	}

	pub fn create_user(&self, username: &str, role: Role) -> User {
		self.create_user_with_hash(username, role, "unset")
	}

	pub fn create_user_with_hash(&self, username: &str, role: Role, password_hash: &str) -> User {
		let email = format!("{}@gmail.com", username);
		self.user_repo.create_user(&NewUser {
			username,
			first_name: username,
			last_name: "Tester",
			email: &email,
			role,
		}, password_hash).unwrap()
	}

	pub fn create_account(&self, owner: &User, account_type: AccountType, status: AccountStatus, balance: i32) -> Account {
		self.account_repo.create_account(owner.id, &NewAccount {
			balance: BigDecimal::from(balance),
			status,
			account_type,
		}).unwrap()
	}
}
