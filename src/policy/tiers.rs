//! Local-preference tier table.

use std::fmt;

use crate::config::LocalPreferenceConfig;
use crate::error::PolicyError;

/// Condition classes of the cold-potato preference hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Anycast prefix originated by the fleet
    Anycast,
    /// AS path of length exactly one
    Direct,
    OwnCountry,
    PeerCountry,
    OwnRegion,
    PeerRegion,
    /// Anything else inside the expected address space
    Default,
}

impl Tier {
    pub const ALL: [Tier; 7] = [
        Tier::Anycast,
        Tier::Direct,
        Tier::OwnCountry,
        Tier::PeerCountry,
        Tier::OwnRegion,
        Tier::PeerRegion,
        Tier::Default,
    ];

    pub fn default_preference(&self) -> u32 {
        match self {
            Tier::Anycast => 500,
            Tier::Direct => 300,
            Tier::OwnCountry => 230,
            Tier::PeerCountry => 220,
            Tier::OwnRegion => 210,
            Tier::PeerRegion => 200,
            Tier::Default => 100,
        }
    }

    fn configured(&self, config: &LocalPreferenceConfig) -> Option<u32> {
        match self {
            Tier::Anycast => config.anycast,
            Tier::Direct => config.direct,
            Tier::OwnCountry => config.own_country,
            Tier::PeerCountry => config.peer_country,
            Tier::OwnRegion => config.own_region,
            Tier::PeerRegion => config.peer_region,
            Tier::Default => config.default,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Anycast => "anycast",
            Tier::Direct => "direct",
            Tier::OwnCountry => "own_country",
            Tier::PeerCountry => "peer_country",
            Tier::OwnRegion => "own_region",
            Tier::PeerRegion => "peer_region",
            Tier::Default => "default",
        };
        write!(f, "{}", name)
    }
}

/// Tiers with their preference values, strictly descending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    entries: Vec<(Tier, u32)>,
}

impl TierTable {
    /// Build the table. The anycast tier only exists when anycast prefixes are configured.
    pub fn from_config(
        config: &LocalPreferenceConfig,
        with_anycast: bool,
    ) -> Result<Self, PolicyError> {
        let mut entries: Vec<(Tier, u32)> = Tier::ALL
            .iter()
            .filter(|tier| with_anycast || **tier != Tier::Anycast)
            .map(|tier| {
                (
                    *tier,
                    tier.configured(config)
                        .unwrap_or_else(|| tier.default_preference()),
                )
            })
            .collect();

        entries.sort_by(|a, b| b.1.cmp(&a.1));

        for pair in entries.windows(2) {
            if pair[0].1 == pair[1].1 {
                return Err(PolicyError::AmbiguousTier {
                    first: pair[0].0.to_string(),
                    second: pair[1].0.to_string(),
                    value: pair[0].1,
                });
            }
        }

        Ok(TierTable { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Tier, u32)> {
        self.entries.iter()
    }

    pub fn preference(&self, tier: Tier) -> Option<u32> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, value)| *value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let table = TierTable::from_config(&LocalPreferenceConfig::default(), true).unwrap();
        let values: Vec<u32> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![500, 300, 230, 220, 210, 200, 100]);
    }

    #[test]
    fn test_anycast_tier_only_when_configured() {
        let table = TierTable::from_config(&LocalPreferenceConfig::default(), false).unwrap();
        assert_eq!(table.preference(Tier::Anycast), None);
        assert_eq!(table.iter().next(), Some(&(Tier::Direct, 300)));
    }

    #[test]
    fn test_equal_values_are_ambiguous() {
        let config = LocalPreferenceConfig {
            peer_country: Some(230),
            ..Default::default()
        };
        let err = TierTable::from_config(&config, false).unwrap_err();
        assert_eq!(
            err,
            PolicyError::AmbiguousTier {
                first: "own_country".to_string(),
                second: "peer_country".to_string(),
                value: 230,
            }
        );
    }

    #[test]
    fn test_configured_values_reorder() {
        let config = LocalPreferenceConfig {
            peer_region: Some(400),
            ..Default::default()
        };
        let table = TierTable::from_config(&config, false).unwrap();
        assert_eq!(table.iter().next(), Some(&(Tier::PeerRegion, 400)));
    }
}
