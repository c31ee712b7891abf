/// Row identifier shared by users and accounts
pub type Id = i32;

/// Opaque handle of an authenticated session
pub type SessionId = uuid::Uuid;
