//! Transport room token issuance
//!
//! The transport requires a signed token to join a room. Issuance is
//! balance-gated: the funding source behind the requested room must still be
//! able to pay before a token is minted, so a depleted client cannot open a
//! fresh session by replaying an old room id.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use solace_core::{
    models::{FundingSource, Wallet},
    AppError, AppResult, RatePolicy,
};
use tracing::{debug, warn};

/// Claims carried by a room token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomClaims {
    /// Joining user id
    pub sub: String,

    /// Room the token is valid for
    pub room: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Issues short-lived transport room tokens
pub struct RoomTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
    policy: RatePolicy,
}

impl RoomTokenIssuer {
    /// Create a new issuer
    pub fn new(secret: &str, ttl_secs: i64, policy: RatePolicy) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
            policy,
        }
    }

    /// Check the funding source behind a room still has balance, then mint
    ///
    /// Mirrors the selection rules: a named plan must exist, be unexpired
    /// and have allotment left; a token-pool room needs at least the
    /// smallest billable unit; a free-trial room needs grant left.
    pub fn authorize_and_issue(
        &self,
        wallet: &Wallet,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        match FundingSource::from_room_id(room_id) {
            FundingSource::Plan { id } => {
                let plan = wallet
                    .plan(&id)
                    .ok_or_else(|| AppError::PlanNotFound(id.clone()))?;
                if plan.is_expired(now) {
                    warn!(plan_id = %id, "Refusing room token for expired plan");
                    return Err(AppError::PlanExpired(id));
                }
                if !plan.qualifies(plan.kind, now) {
                    return Err(AppError::InsufficientBalance {
                        required: "1".to_string(),
                        available: plan.remaining.to_string(),
                    });
                }
            }
            FundingSource::TokenPool => {
                // The session kind is not recoverable from the room id; the
                // smallest billable unit (one chat message) gates issuance,
                // and per-unit settlement enforces the real cost.
                let minimum = self
                    .policy
                    .min_chat_tokens()
                    .min(self.policy.min_call_tokens());
                if wallet.tokens < minimum {
                    return Err(AppError::InsufficientBalance {
                        required: minimum.to_string(),
                        available: wallet.tokens.to_string(),
                    });
                }
            }
            FundingSource::FreeTrial => {
                if wallet.free_messages_remaining <= 0 {
                    return Err(AppError::FreeMessagesExhausted);
                }
            }
        }

        let claims = RoomClaims {
            sub: wallet.user_id.clone(),
            room: room_id.to_string(),
            exp: (now + chrono::Duration::seconds(self.ttl_secs)).timestamp(),
        };

        debug!(user_id = %wallet.user_id, room = %room_id, "Issuing room token");

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Room token creation failed: {}", e)))
    }

    /// Validate a room token (used by the transport-facing edge)
    pub fn validate(&self, token: &str) -> AppResult<RoomClaims> {
        let data = decode::<RoomClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| AppError::InvalidToken(format!("Room token invalid: {}", e)))?;
        Ok(data.claims)
    }
}
