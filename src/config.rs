use std::env;
use std::error;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;
use dotenv::dotenv;

/// Runtime settings for the bank back-end
#[derive(Debug, Clone)]
pub struct Config {
	pub database_url: Option<String>,
	pub bind_addr: SocketAddr,
	pub pool_size: u32,
	pub pool_timeout: Duration,
	pub lock_timeout: Duration,
	pub statement_timeout: Duration,
	/// Extra attempts for a single-account operation that hit a transient store failure
	pub store_retries: u32,
	/// Monthly rate applied when time is passed over the savings accounts
	pub savings_rate: BigDecimal,
	/// Administrator created at startup when the username is not taken yet
	pub admin: Option<AdminLogin>,
}

/// Login of the administrator seeded at startup
#[derive(Clone, PartialEq)]
pub struct AdminLogin {
	pub username: String,
	pub password: String,
}

impl fmt::Debug for AdminLogin {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("AdminLogin")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

impl Default for Config {
	fn default() -> Self {
		Config {
			database_url: None,
			bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
			pool_size: 10,
			pool_timeout: Duration::from_millis(5000),
			lock_timeout: Duration::from_millis(2000),
			statement_timeout: Duration::from_millis(5000),
			store_retries: 2,
			savings_rate: BigDecimal::new(1.into(), 2),
			admin: None,
		}
	}
}

impl Config {
	/// Read the configuration from the process environment
	///
	/// Loads `.env` file in the environment's directory first
	pub fn from_env() -> Result<Config, Error> {
		dotenv().ok();
		Config::from_lookup(|key: &str| env::var(key).ok())
	}

	/// Build a configuration from any key lookup, falling back to the defaults for
	/// keys that are absent
	pub fn from_lookup<F>(lookup: F) -> Result<Config, Error>
		where F: Fn(&str) -> Option<String>
	{
		let defaults = Config::default();
		Ok(Config {
			database_url: lookup("DATABASE_URL"),
			bind_addr: parse(&lookup, "BANK_BIND_ADDR", defaults.bind_addr)?,
			pool_size: parse(&lookup, "BANK_POOL_SIZE", defaults.pool_size)?,
			pool_timeout: millis(&lookup, "BANK_POOL_TIMEOUT_MS", defaults.pool_timeout)?,
			lock_timeout: millis(&lookup, "BANK_LOCK_TIMEOUT_MS", defaults.lock_timeout)?,
			statement_timeout: millis(&lookup, "BANK_STATEMENT_TIMEOUT_MS", defaults.statement_timeout)?,
			store_retries: parse(&lookup, "BANK_STORE_RETRIES", defaults.store_retries)?,
			savings_rate: parse(&lookup, "BANK_SAVINGS_RATE", defaults.savings_rate)?,
			admin: admin_login(&lookup)?,
		})
	}
}

fn admin_login<F>(lookup: &F) -> Result<Option<AdminLogin>, Error>
	where F: Fn(&str) -> Option<String>
{
	match (lookup("BANK_ADMIN_USERNAME"), lookup("BANK_ADMIN_PASSWORD")) {
		(None, None) => Ok(None),
		(Some(username), Some(password)) if !username.trim().is_empty() && !password.is_empty() => {
			Ok(Some(AdminLogin { username: username.trim().to_string(), password }))
		}
		(Some(_), None) => Err(Error {
			key: "BANK_ADMIN_PASSWORD",
			message: "must be set together with BANK_ADMIN_USERNAME".to_string(),
		}),
		(None, Some(_)) => Err(Error {
			key: "BANK_ADMIN_USERNAME",
			message: "must be set together with BANK_ADMIN_PASSWORD".to_string(),
		}),
		(Some(_), Some(_)) => Err(Error {
			key: "BANK_ADMIN_USERNAME",
			message: "username and password must not be empty".to_string(),
		}),
	}
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, Error>
	where F: Fn(&str) -> Option<String>,
		  T: FromStr,
		  T::Err: fmt::Display
{
	match lookup(key) {
		None => Ok(default),
		Some(raw) => raw.trim().parse::<T>().map_err(|e| Error {
			key,
			message: format!("{:?}: {}", raw, e),
		}),
	}
}

fn millis<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, Error>
	where F: Fn(&str) -> Option<String>
{
	let default_ms = default.as_millis() as u64;
	parse(lookup, key, default_ms).map(Duration::from_millis)
}

/// A configuration value that could not be parsed
#[derive(Debug, PartialEq)]
pub struct Error {
	key: &'static str,
	message: String,
}

impl Error {
	pub fn key(&self) -> &str {
		self.key
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "invalid value for {}: {}", self.key, self.message)
	}
}

impl error::Error for Error {}
