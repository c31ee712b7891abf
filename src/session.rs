use dashmap::DashMap;
use log::*;

use crate::auth::{IdentityResolver, Principal};
use crate::types::{Id, SessionId};
use crate::user::Role;

/// Live sessions held in process
///
/// Whatever verifies credentials opens the session; the handle it gets back is what
/// callers present on later requests.
pub struct Registry {
	sessions: DashMap<SessionId, Principal>,
}

impl Registry {
	pub fn new() -> Self {
		Registry { sessions: DashMap::new() }
	}

	pub fn open(&self, principal: Principal) -> SessionId {
		let id = SessionId::new_v4();
		self.sessions.insert(id, principal);
		debug!(target: "bank::auth", "opened session for user {}", principal.user_id);
		id
	}

	/// Returns false when the session was not open
	pub fn close(&self, id: &SessionId) -> bool {
		match self.sessions.remove(id) {
			Some((_, principal)) => {
				debug!(target: "bank::auth", "closed session for user {}", principal.user_id);
				true
			}
			None => false,
		}
	}

	/// Move every live session of `user_id` to `role`; returns how many were open
	pub fn set_role(&self, user_id: Id, role: Role) -> usize {
		let mut changed = 0;
		for mut entry in self.sessions.iter_mut() {
			if entry.value().user_id == user_id {
				entry.value_mut().role = role;
				changed += 1;
			}
		}
		if changed > 0 {
			debug!(target: "bank::auth", "{} sessions of user {} now act as {}", changed, user_id, role);
		}
		changed
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}

impl Default for Registry {
	fn default() -> Self {
		Self::new()
	}
}

impl IdentityResolver for Registry {
	fn resolve(&self, session: &SessionId) -> Option<Principal> {
		self.sessions.get(session).map(|principal| *principal.value())
	}
}
