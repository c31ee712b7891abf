#[macro_use]
extern crate diesel;

pub use account::{Account, AccountStatus, AccountType, NewAccount};
pub use auth::{Authenticator, IdentityResolver, Policy, Principal};
pub use bank::{AccrualReport, Engine, Error, ErrorKind, NewService, Service, Transfer, MAX_ACCRUAL_MONTHS};
pub use config::Config;
pub use session::Registry;
pub use store::{AccountStore, UserStore};
pub use store::memory::MemoryStore;
pub use types::{Id, SessionId};
pub use user::{NewUser, Role, User, UserChanges};

pub mod schema;
pub mod types;
pub mod db;
pub mod config;
pub mod account;
pub mod user;
pub mod store;
pub mod auth;
pub mod password;
pub mod session;
pub mod bank;
pub mod api;

#[cfg(test)]
mod testutil;
