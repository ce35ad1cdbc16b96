//! Purchasable tier catalog
//!
//! The static catalog of plan and token packs. Order creation resolves
//! allotments from here server-side rather than trusting client-supplied
//! quantities.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solace_core::models::{Purchase, ServiceKind};

/// A purchasable tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    /// Stable code sent by the client (e.g., "call-10")
    pub code: &'static str,

    /// Display name
    pub name: &'static str,
}

/// Call packs: minutes for a fixed price
pub const CALL_TIERS: &[(Tier, Decimal, Decimal)] = &[
    (Tier { code: "call-5", name: "Bronze Pack" }, dec!(5), dec!(50)),
    (Tier { code: "call-10", name: "Silver Pack" }, dec!(10), dec!(100)),
    (Tier { code: "call-15", name: "Gold Pack" }, dec!(15), dec!(145)),
    (Tier { code: "call-30", name: "Platinum Pack" }, dec!(30), dec!(270)),
    (Tier { code: "call-45", name: "Diamond Pack" }, dec!(45), dec!(410)),
    (Tier { code: "call-60", name: "Elite Pack" }, dec!(60), dec!(540)),
];

/// Chat packs: messages for a fixed price
pub const CHAT_TIERS: &[(Tier, Decimal, Decimal)] = &[
    (Tier { code: "chat-10", name: "Chat Starter" }, dec!(10), dec!(20)),
    (Tier { code: "chat-20", name: "Chat Basic" }, dec!(20), dec!(36)),
    (Tier { code: "chat-30", name: "Chat Plus" }, dec!(30), dec!(50)),
    (Tier { code: "chat-60", name: "Chat Pro" }, dec!(60), dec!(90)),
    (Tier { code: "chat-90", name: "Chat Max" }, dec!(90), dec!(135)),
    (Tier { code: "chat-120", name: "Chat Elite" }, dec!(120), dec!(170)),
];

/// Token packs: fungible tokens for a fixed price
pub const TOKEN_PACKS: &[(Tier, Decimal, Decimal)] = &[
    (Tier { code: "mt-10", name: "10 Tokens" }, dec!(10), dec!(50)),
    (Tier { code: "mt-20", name: "20 Tokens" }, dec!(20), dec!(95)),
    (Tier { code: "mt-50", name: "50 Tokens" }, dec!(50), dec!(225)),
    (Tier { code: "mt-100", name: "100 Tokens" }, dec!(100), dec!(425)),
];

/// Resolve a tier code into a concrete purchase
///
/// Returns `None` for unknown codes; the order handler maps that to an
/// `UnknownTier` error.
pub fn resolve(code: &str) -> Option<Purchase> {
    for (tier, minutes, price) in CALL_TIERS {
        if tier.code == code {
            return Some(Purchase::Plan {
                service: ServiceKind::Call,
                name: tier.name.to_string(),
                price: *price,
                allotment: *minutes,
            });
        }
    }
    for (tier, messages, price) in CHAT_TIERS {
        if tier.code == code {
            return Some(Purchase::Plan {
                service: ServiceKind::Chat,
                name: tier.name.to_string(),
                price: *price,
                allotment: *messages,
            });
        }
    }
    for (tier, quantity, price) in TOKEN_PACKS {
        if tier.code == code {
            return Some(Purchase::Tokens {
                quantity: *quantity,
                price: *price,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_call_tier() {
        let purchase = resolve("call-10").unwrap();
        match purchase {
            Purchase::Plan {
                service, allotment, price, ..
            } => {
                assert_eq!(service, ServiceKind::Call);
                assert_eq!(allotment, dec!(10));
                assert_eq!(price, dec!(100));
            }
            _ => panic!("expected plan purchase"),
        }
    }

    #[test]
    fn test_resolve_token_pack() {
        let purchase = resolve("mt-50").unwrap();
        match purchase {
            Purchase::Tokens { quantity, price } => {
                assert_eq!(quantity, dec!(50));
                assert_eq!(price, dec!(225));
            }
            _ => panic!("expected token purchase"),
        }
    }

    #[test]
    fn test_unknown_code() {
        assert!(resolve("call-999").is_none());
    }

    #[test]
    fn test_codes_unique() {
        let mut codes: Vec<&str> = CALL_TIERS
            .iter()
            .chain(CHAT_TIERS)
            .chain(TOKEN_PACKS)
            .map(|(t, _, _)| t.code)
            .collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }
}
