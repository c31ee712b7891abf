use std::error;
use std::fmt;

use crate::account::AccountStatus;
use crate::db;
use crate::types::Id;

/// An error that can occur when interacting with the bank
#[derive(Debug, PartialEq)]
pub struct Error {
	kind: ErrorKind,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Error {
		Error { kind }
	}

	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}

	pub fn into_kind(self) -> ErrorKind {
		self.kind
	}

	/// The store failed; repeating the whole operation may succeed
	pub fn is_transient(&self) -> bool {
		matches!(self.kind, ErrorKind::TransientStoreFailure(_))
	}

	pub(crate) fn illegal_amount<S: Into<String>>(reason: S) -> Error {
		Error::new(ErrorKind::IllegalAmount(reason.into()))
	}
}

/// The kind of an error that can occur.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
	/// No principal is attached to the session
	NotAuthenticated,
	/// Unknown username or wrong password
	InvalidCredentials,
	/// The principal is neither an owner nor holds an allowed role
	NotAuthorized,
	/// Non-positive amount, or a movement larger than the available balance
	IllegalAmount(String),
	AccountNotFound(Id),
	/// The account exists but its status forbids balance movements
	AccountNotEligible(Id, AccountStatus),
	UserNotFound(Id),
	/// The username or email already belongs to another user
	UserAlreadyExists,
	/// The store could not complete the operation; safe to retry
	TransientStoreFailure(db::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.kind {
			ErrorKind::NotAuthenticated => write!(f, "not logged in"),
			ErrorKind::InvalidCredentials => write!(f, "invalid login credentials"),
			ErrorKind::NotAuthorized => write!(f, "not authorized"),
			ErrorKind::IllegalAmount(reason) => write!(f, "illegal amount: {}", reason),
			ErrorKind::AccountNotFound(id) => write!(f, "account {} does not exist", id),
			ErrorKind::AccountNotEligible(id, status) => write!(f, "account {} is {}", id, status),
			ErrorKind::UserNotFound(id) => write!(f, "user {} does not exist", id),
			ErrorKind::UserAlreadyExists => write!(f, "username or email already in use"),
			ErrorKind::TransientStoreFailure(e) => write!(f, "store failure: {}", e),
		}
	}
}

impl error::Error for Error {}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Self {
		Error::new(kind)
	}
}

impl From<db::Error> for Error {
	fn from(e: db::Error) -> Self {
		Error::new(ErrorKind::TransientStoreFailure(e))
	}
}

impl From<r2d2::Error> for Error {
	fn from(e: r2d2::Error) -> Self {
		Error::new(ErrorKind::TransientStoreFailure(db::Error::from(e)))
	}
}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		Error::new(ErrorKind::TransientStoreFailure(db::Error::from(e)))
	}
}
