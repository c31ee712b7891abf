pub use engine::{AccrualFailure, AccrualReport, Engine, Transfer, MAX_ACCRUAL_MONTHS};
pub use error::{Error, ErrorKind};
pub use service::{NewService, Service};

pub mod engine;
pub mod error;
pub mod service;

pub type Result<T> = std::result::Result<T, Error>;
