//! DN42 community encoding.
//!
//! Region communities are `64511:{region code}` and country communities are
//! `64511:{1000 + ISO 3166-1 numeric}`. The built-in tables cover the DN42
//! region set and the countries most DN42 networks sit in; the global
//! configuration can add to or replace entries in either table.

use std::collections::BTreeMap;

use super::types::Community;

/// ASN used by the DN42 community scheme
pub const DN42_COMMUNITY_ASN: u16 = 64511;

const COUNTRY_BASE: u16 = 1000;

/// DN42 region codes, keyed by region slug
const REGIONS: &[(&str, u16)] = &[
    ("europe", 41),
    ("north-america-e", 42),
    ("north-america-c", 43),
    ("north-america-w", 44),
    ("central-america", 45),
    ("south-america-e", 46),
    ("south-america-w", 47),
    ("africa-n", 48),
    ("africa-s", 49),
    ("asia-s", 50),
    ("asia-se", 51),
    ("asia-e", 52),
    ("pacific-oceania", 53),
    ("oceania", 53),
    ("antarctica", 54),
    ("asia-n", 55),
    ("asia-w", 56),
    ("central-asia", 57),
];

/// ISO 3166-1 numeric codes, keyed by alpha-2 code
const COUNTRIES: &[(&str, u16)] = &[
    ("AE", 784),
    ("AR", 32),
    ("AT", 40),
    ("AU", 36),
    ("BE", 56),
    ("BG", 100),
    ("BR", 76),
    ("CA", 124),
    ("CH", 756),
    ("CL", 152),
    ("CN", 156),
    ("CZ", 203),
    ("DE", 276),
    ("DK", 208),
    ("EE", 233),
    ("ES", 724),
    ("FI", 246),
    ("FR", 250),
    ("GB", 826),
    ("GR", 300),
    ("HK", 344),
    ("HU", 348),
    ("ID", 360),
    ("IE", 372),
    ("IL", 376),
    ("IN", 356),
    ("IS", 352),
    ("IT", 380),
    ("JP", 392),
    ("KR", 410),
    ("LT", 440),
    ("LU", 442),
    ("LV", 428),
    ("MX", 484),
    ("MY", 458),
    ("NL", 528),
    ("NO", 578),
    ("NZ", 554),
    ("PH", 608),
    ("PL", 616),
    ("PT", 620),
    ("RO", 642),
    ("RU", 643),
    ("SE", 752),
    ("SG", 702),
    ("TH", 764),
    ("TR", 792),
    ("TW", 158),
    ("UA", 804),
    ("US", 840),
    ("VN", 704),
    ("ZA", 710),
];

/// Lower-case a name and collapse everything else to single dashes
/// (`"North America-E"` -> `north-america-e`)
pub fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Community list carrying one region's community
pub fn region_list_name(region: &str) -> String {
    format!("cl-region-{}", slug(region))
}

/// Community list carrying one country's community
pub fn country_list_name(country: &str) -> String {
    format!("cl-country-{}", country.to_uppercase())
}

/// Lookup table for region and country communities
#[derive(Debug, Clone)]
pub struct CommunityTable {
    regions: BTreeMap<String, u16>,
    countries: BTreeMap<String, u16>,
}

impl CommunityTable {
    /// Built-in tables extended by configured entries; configured codes win
    pub fn new(regions: &BTreeMap<String, u16>, countries: &BTreeMap<String, u16>) -> Self {
        let mut table = Self::builtin();
        for (name, code) in regions {
            table.regions.insert(slug(name), *code);
        }
        for (code, numeric) in countries {
            table.countries.insert(code.to_uppercase(), *numeric);
        }
        table
    }

    pub fn builtin() -> Self {
        CommunityTable {
            regions: REGIONS.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            countries: COUNTRIES.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    /// `64511:{code}` for a region name
    pub fn region(&self, region: &str) -> Option<Community> {
        self.regions
            .get(&slug(region))
            .map(|code| Community::new(DN42_COMMUNITY_ASN, *code))
    }

    /// `64511:{1000 + numeric}` for an alpha-2 country code
    pub fn country(&self, country: &str) -> Option<Community> {
        self.countries
            .get(&country.to_uppercase())
            .and_then(|numeric| numeric.checked_add(COUNTRY_BASE))
            .map(|value| Community::new(DN42_COMMUNITY_ASN, value))
    }
}
