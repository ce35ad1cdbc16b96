//! Funding source and decision types
//!
//! `FundingSource` is an explicit tagged union: the settlement service
//! branches on the variant, never on id-string prefixes. Legacy room ids
//! with a `token_session_` / `mt_` prefix still parse as the token pool for
//! wire compatibility with older clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::plan::ServiceKind;

/// What funds a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FundingSource {
    /// A specific purchased plan
    Plan {
        /// The plan's id within the owning wallet
        id: String,
    },
    /// The fungible token pool, billed per use
    TokenPool,
    /// The one-time signup grant; never billed
    FreeTrial,
}

impl FundingSource {
    /// Room/correlation id prefix for token-pool sessions
    pub const TOKEN_ROOM_PREFIX: &'static str = "mt-";

    /// Parse a transport room id back into a funding source
    pub fn from_room_id(room_id: &str) -> Self {
        if room_id.starts_with(Self::TOKEN_ROOM_PREFIX)
            || room_id.starts_with("token_session_")
            || room_id.starts_with("mt_session_")
        {
            FundingSource::TokenPool
        } else if room_id.starts_with("free_trial_") {
            FundingSource::FreeTrial
        } else {
            FundingSource::Plan {
                id: room_id.to_string(),
            }
        }
    }

    /// True when this source is the token pool
    pub fn is_token_pool(&self) -> bool {
        matches!(self, FundingSource::TokenPool)
    }

    /// True when this source is the free trial grant
    pub fn is_free_trial(&self) -> bool {
        matches!(self, FundingSource::FreeTrial)
    }
}

impl fmt::Display for FundingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingSource::Plan { id } => write!(f, "plan:{}", id),
            FundingSource::TokenPool => write!(f, "token_pool"),
            FundingSource::FreeTrial => write!(f, "free_trial"),
        }
    }
}

/// Output of the plan selector: how a new session will be funded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingDecision {
    /// Chosen funding source
    pub source: FundingSource,

    /// Session kind the decision was made for
    pub kind: ServiceKind,

    /// Room/correlation id handed to the realtime transport
    pub room_id: String,

    /// Display label ("Silver Pack", "Token session", "Free trial")
    pub label: String,

    /// Hard session duration ceiling, independent of balance
    pub session_cap_secs: u32,
}

impl FundingDecision {
    /// Decision funded by a specific plan
    pub fn from_plan(kind: ServiceKind, plan_id: &str, label: &str, cap_secs: u32) -> Self {
        Self {
            source: FundingSource::Plan {
                id: plan_id.to_string(),
            },
            kind,
            room_id: plan_id.to_string(),
            label: label.to_string(),
            session_cap_secs: cap_secs,
        }
    }

    /// Decision funded by the token pool; mints a fresh room id
    pub fn from_token_pool(kind: ServiceKind, cap_secs: u32) -> Self {
        Self {
            source: FundingSource::TokenPool,
            kind,
            room_id: format!("{}{}", FundingSource::TOKEN_ROOM_PREFIX, Uuid::new_v4()),
            label: "Token session".to_string(),
            session_cap_secs: cap_secs,
        }
    }

    /// Free-trial chat decision; mints a fresh room id
    pub fn free_trial(cap_secs: u32) -> Self {
        Self {
            source: FundingSource::FreeTrial,
            kind: ServiceKind::Chat,
            room_id: format!("free_trial_{}", Uuid::new_v4()),
            label: "Free trial".to_string(),
            session_cap_secs: cap_secs,
        }
    }

    /// True when the decision is a free-trial session
    pub fn is_free_trial(&self) -> bool {
        self.source.is_free_trial()
    }
}
