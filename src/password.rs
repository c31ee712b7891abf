//! Argon2id password hashes in PHC string format.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use log::*;

pub type Error = password_hash::Error;

/// Hash a password with a fresh salt
pub fn hash(password: &str) -> Result<String, Error> {
	let salt = SaltString::generate(&mut OsRng);
	let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
	Ok(hash.to_string())
}

/// Check a password against a stored hash
///
/// A stored hash that cannot be parsed never matches.
pub fn verify(password: &str, stored: &str) -> bool {
	let parsed = match PasswordHash::new(stored) {
		Ok(parsed) => parsed,
		Err(e) => {
			warn!(target: "bank::auth", "unreadable password hash: {}", e);
			return false;
		}
	};

	match Argon2::default().verify_password(password.as_bytes(), &parsed) {
		Ok(()) => true,
		Err(password_hash::Error::Password) => false,
		Err(e) => {
			warn!(target: "bank::auth", "password verification failed: {}", e);
			false
		}
	}
}

/// Spend the time a real verification would, for logins naming no known user
pub fn verify_nothing(password: &str) {
	if let Err(e) = hash(password) {
		debug!(target: "bank::auth", "hashing for an unknown user failed: {}", e);
	}
}
