//! JWT Claims structure
//!
//! Defines the claims structure used in JWT tokens for caller identity.
//! Identity itself (phone OTP / Google sign-in) is established elsewhere;
//! this service only validates bearer tokens and matches the subject against
//! the wallet being touched.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular app user (spends balance)
    #[default]
    User,
    /// Listener (earns from sessions)
    Listener,
    /// Platform administrator
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Listener => write!(f, "listener"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

/// JWT Claims
///
/// The subject is the user id whose wallet the caller may read and whose
/// consumption the caller may propose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    /// Caller role
    pub role: UserRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims with the specified user id and role
    ///
    /// # Examples
    ///
    /// ```
    /// use solace_auth::claims::{Claims, UserRole};
    ///
    /// let claims = Claims::new("user-1", UserRole::User);
    /// assert_eq!(claims.sub, "user-1");
    /// ```
    pub fn new(user_id: &str, role: UserRole) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: 0, // Will be set by JwtService
        }
    }

    /// Create new claims with a custom expiration duration
    pub fn with_expiration(user_id: &str, role: UserRole, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in_secs);

        Self {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp();
        self.exp <= now
    }

    /// Get the user id from the claims
    pub fn user_id(&self) -> &str {
        &self.sub
    }
}
