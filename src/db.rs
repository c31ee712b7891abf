use std::error;
use std::fmt;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use diesel::r2d2::ConnectionManager;
use diesel::result::DatabaseErrorKind::UniqueViolation;
use diesel::result::Error::{DatabaseError, NotFound};
use log::*;

use crate::config::Config;

pub type Result<T> = std::result::Result<T, Error>;
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Get a pooled connection to the underlying PostgreSQL database
///
/// `DATABASE_URL` must be set in the configuration. Every connection handed out by the
/// pool carries the configured `lock_timeout` and `statement_timeout`, so a contended
/// row lock surfaces as an error instead of blocking the caller.
pub fn pg_connection(config: &Config) -> Result<PgPool> {
	let database_url = config.database_url.as_ref()
		.ok_or_else(|| Error::Connection("DATABASE_URL must be set".to_string()))?;

	let manager = ConnectionManager::<PgConnection>::new(database_url.as_str());
	let pool = r2d2::Pool::builder()
		.max_size(config.pool_size)
		.connection_timeout(config.pool_timeout)
		.connection_customizer(Box::new(SessionTimeouts {
			lock_timeout: config.lock_timeout,
			statement_timeout: config.statement_timeout,
		}))
		.build(manager)?;

	info!(target: "bank::store", "connection pool ready (max size {})", config.pool_size);
	Ok(pool)
}

#[derive(Debug)]
struct SessionTimeouts {
	lock_timeout: Duration,
	statement_timeout: Duration,
}

impl r2d2::CustomizeConnection<PgConnection, diesel::r2d2::Error> for SessionTimeouts {
	fn on_acquire(&self, conn: &mut PgConnection) -> std::result::Result<(), diesel::r2d2::Error> {
		conn.batch_execute(&format!(
			"SET lock_timeout = {}; SET statement_timeout = {};",
			self.lock_timeout.as_millis(),
			self.statement_timeout.as_millis(),
		)).map_err(diesel::r2d2::Error::QueryError)
	}
}

/// Error that can occur when querying against the database
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	RecordAlreadyExists,
	RecordNotFound,
	Connection(String),
	/// Used as a catch-all for everything else the database reports
	DatabaseError(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RecordAlreadyExists => write!(f, "record violates a unique constraint"),
			Error::RecordNotFound => write!(f, "record does not exist"),
			Error::Connection(e) => write!(f, "opening database connection: {}", e),
			Error::DatabaseError(e) => write!(f, "database error: {}", e),
		}
	}
}

impl error::Error for Error {}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		match e {
			DatabaseError(UniqueViolation, _) => Error::RecordAlreadyExists,
			NotFound => Error::RecordNotFound,

			_ => Error::DatabaseError(e.to_string()),
		}
	}
}

impl From<r2d2::Error> for Error {
	fn from(e: r2d2::Error) -> Self {
		Error::Connection(e.to_string())
	}
}
