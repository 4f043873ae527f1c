//! # Complexity Registry
//!
//! ## Responsibility
//! Map each supported complexity tier to the parameters used to build a
//! generation request: the audience instruction, the output-token ceiling,
//! and the sampling temperature.
//!
//! ## Guarantees
//! - Closed: exactly five tiers, each with exactly one profile
//! - Immutable: the table is a `static` and is never written after start-up
//! - Ordered: output ceilings never shrink and temperatures never rise as
//!   tiers move from casual to technical (see [`check_tier_ordering`])
//!
//! ## NOT Responsible For
//! - Validating topics (that belongs to `orchestrator`)
//! - Talking to providers (that belongs to `provider`)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Supported explanation tiers, ordered from casual to technical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// "Explain like I'm five".
    Eli5,
    /// "Explain like I'm ten".
    Eli10,
    /// Teenager with some background.
    Teen,
    /// Undergraduate level with proper terminology.
    College,
    /// Full technical depth.
    Expert,
}

impl Complexity {
    /// All tiers in ascending order of sophistication.
    pub const ALL: [Complexity; 5] = [
        Complexity::Eli5,
        Complexity::Eli10,
        Complexity::Teen,
        Complexity::College,
        Complexity::Expert,
    ];

    /// Wire identifier of this tier (e.g. `"eli5"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Eli5 => "eli5",
            Complexity::Eli10 => "eli10",
            Complexity::Teen => "teen",
            Complexity::College => "college",
            Complexity::Expert => "expert",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation parameters for one complexity tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityProfile {
    /// Tier this profile belongs to.
    pub id: Complexity,
    /// Natural-language directive describing audience and style.
    pub instruction: &'static str,
    /// Hard ceiling on generated tokens passed to the provider.
    pub max_output_tokens: u32,
    /// Sampling temperature in `[0.0, 1.0]`.
    pub temperature: f32,
}

/// Returned by [`ComplexityRegistry::lookup`] when an identifier is not one
/// of the supported tiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown complexity '{requested}'")]
pub struct UnknownComplexity {
    /// The identifier the caller asked for.
    pub requested: String,
}

/// Violation of the tier ordering invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TierOrderingError {
    /// A more technical tier has a smaller output ceiling.
    #[error("tier '{higher}' caps output at {higher_tokens} tokens, below '{lower}' ({lower_tokens})")]
    ShrinkingCeiling {
        /// Less sophisticated tier.
        lower: Complexity,
        /// Its ceiling.
        lower_tokens: u32,
        /// More sophisticated tier.
        higher: Complexity,
        /// Its ceiling.
        higher_tokens: u32,
    },
    /// A more technical tier samples with a higher temperature.
    #[error("tier '{higher}' samples at {higher_temp}, hotter than '{lower}' ({lower_temp})")]
    RisingTemperature {
        /// Less sophisticated tier.
        lower: Complexity,
        /// Its temperature.
        lower_temp: f32,
        /// More sophisticated tier.
        higher: Complexity,
        /// Its temperature.
        higher_temp: f32,
    },
    /// A profile is outside the permitted parameter ranges.
    #[error("tier '{0}' has out-of-range parameters")]
    OutOfRange(Complexity),
}

/// Read-only table of complexity profiles.
///
/// Obtain the process-wide instance with [`ComplexityRegistry::global`]; it
/// is shared by reference across all request handlers and needs no locking.
#[derive(Debug)]
pub struct ComplexityRegistry {
    profiles: [ComplexityProfile; 5],
}

static REGISTRY: ComplexityRegistry = ComplexityRegistry {
    profiles: [
        ComplexityProfile {
            id: Complexity::Eli5,
            instruction: "Explain this like I'm 5 years old, using very simple words and fun examples.",
            max_output_tokens: 400,
            temperature: 0.8,
        },
        ComplexityProfile {
            id: Complexity::Eli10,
            instruction: "Explain this like I'm 10 years old, using clear language and relatable examples.",
            max_output_tokens: 550,
            temperature: 0.75,
        },
        ComplexityProfile {
            id: Complexity::Teen,
            instruction: "Explain this like I'm a teenager, with some detail but still easy to understand.",
            max_output_tokens: 700,
            temperature: 0.7,
        },
        ComplexityProfile {
            id: Complexity::College,
            instruction: "Explain this at a college level with proper terminology.",
            max_output_tokens: 900,
            temperature: 0.5,
        },
        ComplexityProfile {
            id: Complexity::Expert,
            instruction: "Explain this with full technical detail for an expert.",
            max_output_tokens: 1200,
            temperature: 0.3,
        },
    ],
};

impl ComplexityRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static ComplexityRegistry {
        &REGISTRY
    }

    /// Resolve a wire identifier to its profile.
    ///
    /// Matching is exact and case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownComplexity`] if `id` is not one of [`Self::allowed_ids`].
    pub fn lookup(&self, id: &str) -> Result<&ComplexityProfile, UnknownComplexity> {
        self.profiles
            .iter()
            .find(|p| p.id.as_str() == id)
            .ok_or_else(|| UnknownComplexity {
                requested: id.to_string(),
            })
    }

    /// Profile for an already-typed tier. Infallible because the table is total.
    pub fn profile(&self, tier: Complexity) -> &ComplexityProfile {
        // Table is laid out in `Complexity::ALL` order.
        &self.profiles[tier as usize]
    }

    /// All profiles in tier order.
    pub fn profiles(&self) -> &[ComplexityProfile] {
        &self.profiles
    }

    /// Supported identifiers in tier order.
    pub fn allowed_ids(&self) -> Vec<&'static str> {
        self.profiles.iter().map(|p| p.id.as_str()).collect()
    }
}

/// Verify the ordering invariant of a profile table.
///
/// Ceilings must be positive and non-decreasing, temperatures within
/// `[0.0, 1.0]` and non-increasing, as tiers go from casual to technical.
///
/// # Errors
///
/// Returns the first [`TierOrderingError`] found.
pub fn check_tier_ordering(profiles: &[ComplexityProfile]) -> Result<(), TierOrderingError> {
    for p in profiles {
        if p.max_output_tokens == 0 || !(0.0..=1.0).contains(&p.temperature) {
            return Err(TierOrderingError::OutOfRange(p.id));
        }
    }

    for pair in profiles.windows(2) {
        let (lower, higher) = (&pair[0], &pair[1]);
        if higher.max_output_tokens < lower.max_output_tokens {
            return Err(TierOrderingError::ShrinkingCeiling {
                lower: lower.id,
                lower_tokens: lower.max_output_tokens,
                higher: higher.id,
                higher_tokens: higher.max_output_tokens,
            });
        }
        if higher.temperature > lower.temperature {
            return Err(TierOrderingError::RisingTemperature {
                lower: lower.id,
                lower_temp: lower.temperature,
                higher: higher.id,
                higher_temp: higher.temperature,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_resolves_every_tier() {
        let registry = ComplexityRegistry::global();
        for tier in Complexity::ALL {
            let profile = registry.lookup(tier.as_str()).expect("tier must resolve");
            assert_eq!(profile.id, tier);
        }
    }

    #[test]
    fn test_lookup_unknown_returns_not_found() {
        let err = ComplexityRegistry::global()
            .lookup("unknown-tier")
            .unwrap_err();
        assert_eq!(err.requested, "unknown-tier");
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(ComplexityRegistry::global().lookup("ELI5").is_err());
        assert!(ComplexityRegistry::global().lookup(" eli5").is_err());
    }

    #[test]
    fn test_profile_index_matches_tier() {
        let registry = ComplexityRegistry::global();
        for tier in Complexity::ALL {
            assert_eq!(registry.profile(tier).id, tier);
        }
    }

    #[test]
    fn test_builtin_table_satisfies_ordering() {
        check_tier_ordering(ComplexityRegistry::global().profiles())
            .expect("built-in table must be ordered");
    }

    #[test]
    fn test_ceilings_non_decreasing_and_temperatures_non_increasing() {
        let profiles = ComplexityRegistry::global().profiles();
        for pair in profiles.windows(2) {
            assert!(pair[1].max_output_tokens >= pair[0].max_output_tokens);
            assert!(pair[1].temperature <= pair[0].temperature);
        }
        assert!(profiles[4].temperature < profiles[0].temperature);
    }

    #[test]
    fn test_check_tier_ordering_rejects_shrinking_ceiling() {
        let mut profiles = ComplexityRegistry::global().profiles().to_vec();
        profiles[3].max_output_tokens = 100;
        let err = check_tier_ordering(&profiles).unwrap_err();
        assert!(matches!(
            err,
            TierOrderingError::ShrinkingCeiling {
                higher: Complexity::College,
                ..
            }
        ));
    }

    #[test]
    fn test_check_tier_ordering_rejects_rising_temperature() {
        let mut profiles = ComplexityRegistry::global().profiles().to_vec();
        profiles[4].temperature = 0.9;
        let err = check_tier_ordering(&profiles).unwrap_err();
        assert!(matches!(err, TierOrderingError::RisingTemperature { .. }));
    }

    #[test]
    fn test_check_tier_ordering_rejects_zero_ceiling() {
        let mut profiles = ComplexityRegistry::global().profiles().to_vec();
        profiles[0].max_output_tokens = 0;
        assert_eq!(
            check_tier_ordering(&profiles),
            Err(TierOrderingError::OutOfRange(Complexity::Eli5))
        );
    }

    #[test]
    fn test_allowed_ids_lists_five_tiers_in_order() {
        assert_eq!(
            ComplexityRegistry::global().allowed_ids(),
            vec!["eli5", "eli10", "teen", "college", "expert"]
        );
    }

    #[test]
    fn test_complexity_serializes_lowercase() {
        let json = serde_json::to_string(&Complexity::College).expect("ser");
        assert_eq!(json, "\"college\"");
    }
}
