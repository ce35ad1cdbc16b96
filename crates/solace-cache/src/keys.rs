//! Cache key constants and builders for Solace Billing
//!
//! Standardized key naming for all cached entities, ensuring consistency
//! across the application and preventing key collisions.
//!
//! # Key Patterns
//!
//! - `wallet:{user_id}` - Latest committed wallet snapshot (balance fan-out)
//! - `active_sessions:{user_id}` - Set of live room ids for a user
//! - `room:{room_id}` - Live session descriptor for a room

/// Prefix for wallet snapshots
///
/// Format: `wallet:{user_id}`
pub const WALLET_PREFIX: &str = "wallet";

/// Prefix for the per-user set of live sessions
///
/// Format: `active_sessions:{user_id}`
pub const ACTIVE_SESSIONS_PREFIX: &str = "active_sessions";

/// Prefix for live session descriptors
///
/// Format: `room:{room_id}`
pub const ROOM_PREFIX: &str = "room";

/// Default TTL for wallet snapshots (5 minutes)
pub const WALLET_TTL_SECS: u64 = 300;

/// Default TTL for session registry entries (4 hours, past the longest
/// chat session cap)
pub const SESSION_TTL_SECS: u64 = 14400;

/// Build a cache key for a wallet snapshot
///
/// # Example
///
/// ```
/// use solace_cache::keys::wallet_key;
///
/// assert_eq!(wallet_key("user-1"), "wallet:user-1");
/// ```
pub fn wallet_key(user_id: &str) -> String {
    format!("{}:{}", WALLET_PREFIX, user_id)
}

/// Build a cache key for a user's set of live sessions
///
/// # Example
///
/// ```
/// use solace_cache::keys::active_sessions_key;
///
/// assert_eq!(active_sessions_key("user-1"), "active_sessions:user-1");
/// ```
pub fn active_sessions_key(user_id: &str) -> String {
    format!("{}:{}", ACTIVE_SESSIONS_PREFIX, user_id)
}

/// Build a cache key for a live session descriptor
///
/// # Example
///
/// ```
/// use solace_cache::keys::room_key;
///
/// assert_eq!(room_key("mt-abc"), "room:mt-abc");
/// ```
pub fn room_key(room_id: &str) -> String {
    format!("{}:{}", ROOM_PREFIX, room_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(wallet_key("u1"), "wallet:u1");
        assert_eq!(active_sessions_key("u1"), "active_sessions:u1");
        assert_eq!(room_key("plan-9"), "room:plan-9");
    }

    #[test]
    fn test_key_uniqueness() {
        let keys = vec![wallet_key("1"), active_sessions_key("1"), room_key("1")];
        let unique = keys.iter().collect::<std::collections::HashSet<_>>().len();
        assert_eq!(unique, keys.len());
    }
}
