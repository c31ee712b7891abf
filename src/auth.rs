//! Authorization guards.
//!
//! Every guarded operation is one call into [`Policy`]: resolve the session to a
//! [`Principal`], then check role membership and, where the resource has owners,
//! ownership. Role checks are exact-set: a caller must list every role it accepts.

use std::collections::HashSet;
use std::sync::Arc;

use log::*;
use serde::Serialize;

use crate::bank::{Error, ErrorKind, Result};
use crate::db;
use crate::store::AccountStore;
use crate::types::{Id, SessionId};
use crate::user::Role;

/// The authenticated identity behind a request
#[derive(Serialize, Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
	pub user_id: Id,
	pub role: Role,
}

impl Principal {
	pub fn new(user_id: Id, role: Role) -> Self {
		Principal { user_id, role }
	}

	pub fn has_role(&self, allowed: &[Role]) -> bool {
		allowed.contains(&self.role)
	}
}

/// Maps an opaque session handle to the principal that opened it
pub trait IdentityResolver: Send + Sync {
	fn resolve(&self, session: &SessionId) -> Option<Principal>;
}

/// Verifies a username and password against the stored logins
pub trait Authenticator: Send + Sync {
	/// `None` for an unknown username or a wrong password
	fn authenticate(&self, username: &str, password: &str) -> db::Result<Option<Principal>>;
}

pub fn require_logged_in(principal: Option<&Principal>) -> Result<&Principal> {
	principal.ok_or_else(|| Error::new(ErrorKind::NotAuthenticated))
}

pub fn require_role<'p>(principal: Option<&'p Principal>, allowed: &[Role]) -> Result<&'p Principal> {
	let principal = require_logged_in(principal)?;
	if principal.has_role(allowed) {
		Ok(principal)
	} else {
		Err(denied(principal))
	}
}

/// Passes when the principal is the target user or holds one of the allowed roles
pub fn require_owner_or_role<'p>(
	principal: Option<&'p Principal>,
	target_user_id: Id,
	allowed: &[Role],
) -> Result<&'p Principal> {
	let principal = require_logged_in(principal)?;
	if principal.user_id == target_user_id || principal.has_role(allowed) {
		Ok(principal)
	} else {
		Err(denied(principal))
	}
}

/// Passes when the principal is any of `owners` or holds one of the allowed roles
pub fn require_one_of_owners_or_role<'p>(
	principal: Option<&'p Principal>,
	owners: &HashSet<Id>,
	allowed: &[Role],
) -> Result<&'p Principal> {
	let principal = require_logged_in(principal)?;
	if owners.contains(&principal.user_id) || principal.has_role(allowed) {
		Ok(principal)
	} else {
		Err(denied(principal))
	}
}

fn denied(principal: &Principal) -> Error {
	debug!(target: "bank::auth", "denied user {} acting as {}", principal.user_id, principal.role);
	Error::new(ErrorKind::NotAuthorized)
}

/// Guard evaluation against live sessions and the ownership links in the store
pub struct Policy {
	identity: Arc<dyn IdentityResolver>,
	accounts: Arc<dyn AccountStore>,
}

impl Policy {
	pub fn new(identity: Arc<dyn IdentityResolver>, accounts: Arc<dyn AccountStore>) -> Self {
		Policy { identity, accounts }
	}

	/// `None` for an absent or unknown session
	pub fn principal(&self, session: Option<&SessionId>) -> Option<Principal> {
		session.and_then(|id| self.identity.resolve(id))
	}

	pub fn require_logged_in(&self, session: Option<&SessionId>) -> Result<Principal> {
		let principal = self.principal(session);
		require_logged_in(principal.as_ref()).map(|p| *p)
	}

	pub fn require_role(&self, session: Option<&SessionId>, allowed: &[Role]) -> Result<Principal> {
		let principal = self.principal(session);
		require_role(principal.as_ref(), allowed).map(|p| *p)
	}

	pub fn require_owner_or_role(
		&self,
		session: Option<&SessionId>,
		target_user_id: Id,
		allowed: &[Role],
	) -> Result<Principal> {
		let principal = self.principal(session);
		require_owner_or_role(principal.as_ref(), target_user_id, allowed).map(|p| *p)
	}

	/// Passes for any owner of a (possibly joint) account, or an allowed role
	///
	/// The ownership links are only read when the role alone does not decide.
	pub fn require_account_owner_or_role(
		&self,
		session: Option<&SessionId>,
		account_id: Id,
		allowed: &[Role],
	) -> Result<Principal> {
		let principal = self.principal(session);
		let principal = require_logged_in(principal.as_ref())?;
		if principal.has_role(allowed) {
			return Ok(*principal);
		}

		let owners = self.accounts.list_owners(account_id)?;
		require_one_of_owners_or_role(Some(principal), &owners, allowed).map(|p| *p)
	}
}
