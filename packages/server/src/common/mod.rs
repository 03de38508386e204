//! Shared helpers used across domains.

use uuid::Uuid;

/// Generate a time-ordered UUID v7 for database primary keys.
pub fn db_id() -> Uuid {
    Uuid::now_v7()
}

/// Generate an opaque, client-visible job token.
///
/// Random (v4) rather than time-ordered so the token leaks no creation-time
/// information to clients.
pub fn job_token() -> String {
    Uuid::new_v4().to_string()
}
