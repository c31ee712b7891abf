use std::collections::HashSet;

use bigdecimal::BigDecimal;
use diesel::{deserialize, serialize};
use diesel::deserialize::FromSql;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::serialize::{Output, ToSql};
use diesel::sql_types::Integer;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::bank::error::{Error, ErrorKind};
use crate::db;
use crate::schema::{accounts, users_accounts};
use crate::store::AccountStore;
use crate::types::Id;

#[derive(Queryable, Serialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	pub id: Id,
	pub balance: BigDecimal,
	pub status: AccountStatus,
	#[serde(rename = "type")]
	pub account_type: AccountType,
}

impl Account {
	/// Only open accounts may have their balance moved
	pub fn is_open(&self) -> bool {
		self.status == AccountStatus::Open
	}
}

#[derive(Insertable, Deserialize, Clone, Debug)]
#[table_name = "accounts"]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
	pub balance: BigDecimal,
	#[column_name = "status_id"]
	pub status: AccountStatus,
	#[column_name = "type_id"]
	#[serde(rename = "type")]
	pub account_type: AccountType,
}

/// Lifecycle of an account; ids match the `account_status` reference table
#[derive(AsExpression, FromSqlRow, Serialize, Deserialize, EnumString, Display, Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[sql_type = "Integer"]
pub enum AccountStatus {
	Pending,
	Open,
	Closed,
	Denied,
}

impl AccountStatus {
	pub fn id(&self) -> i32 {
		match self {
			AccountStatus::Pending => 1,
			AccountStatus::Open => 2,
			AccountStatus::Closed => 3,
			AccountStatus::Denied => 4,
		}
	}

	pub fn from_id(id: i32) -> Option<Self> {
		match id {
			1 => Some(AccountStatus::Pending),
			2 => Some(AccountStatus::Open),
			3 => Some(AccountStatus::Closed),
			4 => Some(AccountStatus::Denied),
			_ => None,
		}
	}
}

impl ToSql<Integer, Pg> for AccountStatus {
	fn to_sql<W: std::io::Write>(&self, out: &mut Output<W, Pg>) -> serialize::Result {
		ToSql::<Integer, Pg>::to_sql(&self.id(), out)
	}
}

impl FromSql<Integer, Pg> for AccountStatus {
	fn from_sql(bytes: Option<&[u8]>) -> deserialize::Result<Self> {
		let id = <i32 as FromSql<Integer, Pg>>::from_sql(bytes)?;
		AccountStatus::from_id(id).ok_or_else(|| format!("invalid account status id {}", id).into())
	}
}

/// Kind of account; ids match the `account_type` reference table
#[derive(AsExpression, FromSqlRow, Serialize, Deserialize, EnumString, Display, Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[sql_type = "Integer"]
pub enum AccountType {
	Checking,
	Savings,
}

impl AccountType {
	pub fn id(&self) -> i32 {
		match self {
			AccountType::Checking => 1,
			AccountType::Savings => 2,
		}
	}

	pub fn from_id(id: i32) -> Option<Self> {
		match id {
			1 => Some(AccountType::Checking),
			2 => Some(AccountType::Savings),
			_ => None,
		}
	}
}

impl ToSql<Integer, Pg> for AccountType {
	fn to_sql<W: std::io::Write>(&self, out: &mut Output<W, Pg>) -> serialize::Result {
		ToSql::<Integer, Pg>::to_sql(&self.id(), out)
	}
}

impl FromSql<Integer, Pg> for AccountType {
	fn from_sql(bytes: Option<&[u8]>) -> deserialize::Result<Self> {
		let id = <i32 as FromSql<Integer, Pg>>::from_sql(bytes)?;
		AccountType::from_id(id).ok_or_else(|| format!("invalid account type id {}", id).into())
	}
}

/// Data store implementation for operating on accounts in the database
pub struct Repo {
	db: db::PgPool,
}

impl Repo {
	pub fn new(db: db::PgPool) -> Self {
		Repo { db }
	}
}

impl AccountStore for Repo {
	fn find_account(&self, id: Id) -> db::Result<Option<Account>> {
		let conn = &self.db.get()?;
		accounts::table
			.find(id)
			.first::<Account>(conn)
			.optional()
			.map_err(Into::into)
	}

	fn find_accounts(&self) -> db::Result<Vec<Account>> {
		let conn = &self.db.get()?;
		accounts::table
			.order(accounts::id)
			.load::<Account>(conn)
			.map_err(Into::into)
	}

	fn find_accounts_by_status(&self, status: AccountStatus) -> db::Result<Vec<Account>> {
		let conn = &self.db.get()?;
		accounts::table
			.filter(accounts::status_id.eq(status))
			.order(accounts::id)
			.load::<Account>(conn)
			.map_err(Into::into)
	}

	fn find_accounts_by_type(&self, account_type: AccountType) -> db::Result<Vec<Account>> {
		let conn = &self.db.get()?;
		accounts::table
			.filter(accounts::type_id.eq(account_type))
			.order(accounts::id)
			.load::<Account>(conn)
			.map_err(Into::into)
	}

	fn find_accounts_by_owner(&self, user_id: Id) -> db::Result<Vec<Account>> {
		let conn = &self.db.get()?;
		accounts::table
			.inner_join(users_accounts::table)
			.filter(users_accounts::user_id.eq(user_id))
			.select(accounts::all_columns)
			.order(accounts::id)
			.load::<Account>(conn)
			.map_err(Into::into)
	}

	fn list_owners(&self, account_id: Id) -> db::Result<HashSet<Id>> {
		let conn = &self.db.get()?;
		users_accounts::table
			.filter(users_accounts::account_id.eq(account_id))
			.select(users_accounts::user_id)
			.load::<Id>(conn)
			.map(|owners| owners.into_iter().collect())
			.map_err(Into::into)
	}

	fn create_account(&self, owner_id: Id, new_account: &NewAccount) -> db::Result<Account> {
		let conn = &self.db.get()?;
		conn.transaction::<Account, db::Error, _>(|| {
			let account = diesel::insert_into(accounts::table)
				.values(new_account)
				.get_result::<Account>(conn)?;

			diesel::insert_into(users_accounts::table)
				.values((
					users_accounts::user_id.eq(owner_id),
					users_accounts::account_id.eq(account.id),
				))
				.execute(conn)?;

			Ok(account)
		})
	}

	fn add_owner(&self, account_id: Id, user_id: Id) -> db::Result<bool> {
		let conn = &self.db.get()?;
		conn.transaction::<bool, db::Error, _>(|| {
			// holds off a concurrent delete until the link is in
			let locked = accounts::table
				.find(account_id)
				.select(accounts::id)
				.for_update()
				.first::<Id>(conn)
				.optional()?;
			if locked.is_none() {
				return Ok(false);
			}

			diesel::insert_into(users_accounts::table)
				.values((
					users_accounts::user_id.eq(user_id),
					users_accounts::account_id.eq(account_id),
				))
				.on_conflict_do_nothing()
				.execute(conn)?;
			Ok(true)
		})
	}

	fn set_status(&self, id: Id, status: AccountStatus) -> db::Result<Option<Account>> {
		let conn = &self.db.get()?;
		diesel::update(accounts::table.find(id))
			.set(accounts::status_id.eq(status))
			.get_result::<Account>(conn)
			.optional()
			.map_err(Into::into)
	}

	fn delete_account(&self, id: Id) -> db::Result<bool> {
		let conn = &self.db.get()?;
		conn.transaction::<bool, db::Error, _>(|| {
			diesel::delete(users_accounts::table.filter(users_accounts::account_id.eq(id)))
				.execute(conn)?;
			let deleted = diesel::delete(accounts::table.find(id)).execute(conn)?;
			Ok(deleted > 0)
		})
	}

	fn update_balances(
		&self,
		ids: &[Id],
		apply: &mut dyn FnMut(&mut [Account]) -> Result<(), Error>,
	) -> Result<Vec<Account>, Error> {
		let conn = &self.db.get()?;
		conn.transaction::<Vec<Account>, Error, _>(|| {
			// row locks are taken in ascending id order so opposing transfers cannot deadlock
			let mut lock_order = ids.to_vec();
			lock_order.sort_unstable();
			lock_order.dedup();
			for &id in &lock_order {
				accounts::table
					.find(id)
					.select(accounts::id)
					.for_update()
					.first::<Id>(conn)
					.optional()?
					.ok_or_else(|| Error::new(ErrorKind::AccountNotFound(id)))?;
			}

			let mut locked = Vec::with_capacity(ids.len());
			for &id in ids {
				locked.push(accounts::table.find(id).first::<Account>(conn)?);
			}

			apply(&mut locked)?;

			for account in &locked {
				diesel::update(accounts::table.find(account.id))
					.set(accounts::balance.eq(&account.balance))
					.execute(conn)?;
			}

			Ok(locked)
		})
	}
}
