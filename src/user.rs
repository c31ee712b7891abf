use diesel::{deserialize, serialize};
use diesel::deserialize::FromSql;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::serialize::{Output, ToSql};
use diesel::sql_types::Integer;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::auth::{Authenticator, Principal};
use crate::db;
use crate::password;
use crate::schema::{credentials, users};
use crate::store::UserStore;
use crate::types::Id;

#[derive(Queryable, Serialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
	pub id: Id,
	pub username: String,
	pub first_name: String,
	pub last_name: String,
	pub email: String,
	pub role: Role,
}

#[derive(Insertable)]
#[table_name = "users"]
pub struct NewUser<'a> {
	pub username: &'a str,
	pub first_name: &'a str,
	pub last_name: &'a str,
	pub email: &'a str,
	#[column_name = "role_id"]
	pub role: Role,
}

/// Profile fields to change on an existing user; `None` leaves a field as it is
#[derive(AsChangeset, Deserialize, Default, Clone, PartialEq, Debug)]
#[table_name = "users"]
#[serde(rename_all = "camelCase")]
pub struct UserChanges {
	pub username: Option<String>,
	pub first_name: Option<String>,
	pub last_name: Option<String>,
	pub email: Option<String>,
	#[column_name = "role_id"]
	pub role: Option<Role>,
}

impl UserChanges {
	pub fn is_empty(&self) -> bool {
		self.username.is_none()
			&& self.first_name.is_none()
			&& self.last_name.is_none()
			&& self.email.is_none()
			&& self.role.is_none()
	}

	pub(crate) fn apply(&self, user: &mut User) {
		if let Some(username) = &self.username {
			user.username = username.clone();
		}
		if let Some(first_name) = &self.first_name {
			user.first_name = first_name.clone();
		}
		if let Some(last_name) = &self.last_name {
			user.last_name = last_name.clone();
		}
		if let Some(email) = &self.email {
			user.email = email.clone();
		}
		if let Some(role) = self.role {
			user.role = role;
		}
	}
}

/// Role a user acts under; ids match the `roles` reference table
///
/// Roles are flat: no role implies another.
#[derive(AsExpression, FromSqlRow, Serialize, Deserialize, EnumString, Display, Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[sql_type = "Integer"]
pub enum Role {
	Customer,
	Employee,
	Admin,
}

impl Role {
	pub fn id(&self) -> i32 {
		match self {
			Role::Customer => 1,
			Role::Employee => 2,
			Role::Admin => 3,
		}
	}

	pub fn from_id(id: i32) -> Option<Self> {
		match id {
			1 => Some(Role::Customer),
			2 => Some(Role::Employee),
			3 => Some(Role::Admin),
			_ => None,
		}
	}
}

impl ToSql<Integer, Pg> for Role {
	fn to_sql<W: std::io::Write>(&self, out: &mut Output<W, Pg>) -> serialize::Result {
		ToSql::<Integer, Pg>::to_sql(&self.id(), out)
	}
}

impl FromSql<Integer, Pg> for Role {
	fn from_sql(bytes: Option<&[u8]>) -> deserialize::Result<Self> {
		let id = <i32 as FromSql<Integer, Pg>>::from_sql(bytes)?;
		Role::from_id(id).ok_or_else(|| format!("invalid role id {}", id).into())
	}
}

pub struct Repo {
	db: db::PgPool,
}

impl Repo {
	pub fn new(db: db::PgPool) -> Self {
		Repo { db }
	}
}

/// The principal behind a stored login, if `password` matches its hash
///
/// Unknown users cost as much time as a wrong password.
pub(crate) fn check_password(found: Option<(Id, Role, String)>, password: &str) -> Option<Principal> {
	match found {
		Some((id, role, stored)) if password::verify(password, &stored) => Some(Principal::new(id, role)),
		Some(_) => None,
		None => {
			password::verify_nothing(password);
			None
		}
	}
}

impl UserStore for Repo {
	fn find_user(&self, id: Id) -> db::Result<Option<User>> {
		let conn = &self.db.get()?;
		users::table
			.find(id)
			.first::<User>(conn)
			.optional()
			.map_err(Into::into)
	}

	fn find_users(&self) -> db::Result<Vec<User>> {
		let conn = &self.db.get()?;
		users::table
			.order(users::id)
			.load::<User>(conn)
			.map_err(Into::into)
	}

	fn create_user(&self, new_user: &NewUser, password_hash: &str) -> db::Result<User> {
		let conn = &self.db.get()?;
		conn.transaction::<User, db::Error, _>(|| {
			let user = diesel::insert_into(users::table)
				.values(new_user)
				.get_result::<User>(conn)?;
			diesel::insert_into(credentials::table)
				.values((
					credentials::user_id.eq(user.id),
					credentials::password_hash.eq(password_hash),
				))
				.execute(conn)?;
			Ok(user)
		})
	}

	fn update_user(&self, id: Id, changes: &UserChanges) -> db::Result<Option<User>> {
		// diesel refuses an UPDATE without columns
		if changes.is_empty() {
			return self.find_user(id);
		}
		let conn = &self.db.get()?;
		diesel::update(users::table.find(id))
			.set(changes)
			.get_result::<User>(conn)
			.optional()
			.map_err(Into::into)
	}
}

impl Authenticator for Repo {
	fn authenticate(&self, username: &str, password: &str) -> db::Result<Option<Principal>> {
		let conn = &self.db.get()?;
		let found = users::table
			.inner_join(credentials::table)
			.filter(users::username.eq(username))
			.select((users::id, users::role_id, credentials::password_hash))
			.first::<(Id, Role, String)>(conn)
			.optional()?;
		Ok(check_password(found, password))
	}
}
