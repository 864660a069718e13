//! Classifies free-text bin labels into zone, shelf and level.
//!
//! Rules, in priority order:
//! 1. a special-zone marker (or one of its aliases) as a whole word in the
//!    label, ignoring case and any whitespace, `_`, `/` or `-` between its
//!    words, with an optional shelf number right after it;
//! 2. `<Letter><digits>-<digits>` anywhere in the label;
//! 3. otherwise zone `Unknown`, shelf = the trimmed label, level 0.

use crate::entities::zone::ZoneType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use utoipa::ToSchema;

/// Zone name assigned to labels that match no rule.
pub const UNKNOWN_ZONE: &str = "Unknown";

/// Special-purpose areas, in match priority order.
pub const SPECIAL_ZONES: [&str; 10] = [
    "Sample/Damage",
    "Cutsize",
    "Premium",
    "Photocopy",
    "Inkjet",
    "E-Com",
    "Folio Ream",
    "Folio Pallet",
    "Event",
    "Consignment",
];

/// Other spellings found on shelf labels, keyed by zone.
const ZONE_ALIASES: [(&str, &str); 1] = [("Folio Pallet", "Folio Full Pallet")];

const SPECIAL_SORT_BASE: i32 = 100;
const UNKNOWN_SORT_ORDER: i32 = 999;

static STANDARD_BIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([a-z])(\d+)-(\d+)").unwrap());

static SPECIAL_MARKERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    SPECIAL_ZONES
        .iter()
        .map(|zone| {
            let spellings = std::iter::once(*zone)
                .chain(
                    ZONE_ALIASES
                        .iter()
                        .filter(|(target, _)| target == zone)
                        .map(|(_, alias)| *alias),
                )
                .map(marker_pattern)
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(
                r"(?i)(?:^|[^a-z])(?:{})(?:[\s_/-]*(\d+))?(?:$|[^a-z0-9])",
                spellings
            );
            (*zone, Regex::new(&pattern).unwrap())
        })
        .collect()
});

/// Marker words joined by any run of separators.
fn marker_pattern(marker: &str) -> String {
    marker
        .split(|c: char| c.is_whitespace() || matches!(c, '_' | '/' | '-'))
        .filter(|word| !word.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s_/-]*")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ParsedBin {
    pub zone: String,
    pub zone_type: ZoneType,
    pub shelf: String,
    pub level: i32,
}

impl ParsedBin {
    pub fn sort_order(&self) -> i32 {
        zone_sort_order(&self.zone)
    }
}

/// Sort key for zone lists: letters A-Z first, then special zones, then `Unknown`.
pub fn zone_sort_order(zone: &str) -> i32 {
    if let Some(idx) = SPECIAL_ZONES.iter().position(|z| *z == zone) {
        return SPECIAL_SORT_BASE + idx as i32;
    }
    let mut chars = zone.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            (c.to_ascii_uppercase() as u8 - b'A') as i32 + 1
        }
        _ => UNKNOWN_SORT_ORDER,
    }
}

fn parse_special(raw: &str) -> Option<ParsedBin> {
    SPECIAL_MARKERS.iter().find_map(|(zone, pattern)| {
        let caps = pattern.captures(raw)?;
        let shelf = match caps.get(1) {
            Some(digits) => format!("{} {}", zone, digits.as_str()),
            None => zone.to_string(),
        };
        Some(ParsedBin {
            zone: zone.to_string(),
            zone_type: ZoneType::Special,
            shelf,
            level: 0,
        })
    })
}

fn parse_standard(raw: &str) -> Option<ParsedBin> {
    let caps = STANDARD_BIN.captures(raw)?;
    let letter = caps.get(1)?.as_str().to_ascii_uppercase();
    let shelf_no = caps.get(2)?.as_str();
    let level = caps.get(3)?.as_str().parse::<i32>().ok()?;
    Some(ParsedBin {
        shelf: format!("{}{}", letter, shelf_no),
        zone: letter,
        zone_type: ZoneType::Standard,
        level,
    })
}

/// Parses a bin label. Never fails: unmatched labels land in `Unknown`.
pub fn parse_bin_id(raw: &str) -> ParsedBin {
    parse_special(raw)
        .or_else(|| parse_standard(raw))
        .unwrap_or_else(|| ParsedBin {
            zone: UNKNOWN_ZONE.to_string(),
            zone_type: ZoneType::Special,
            shelf: raw.trim().to_string(),
            level: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A1-1", "A", "A1", 1)]
    #[case("OB_Non A1-1", "A", "A1", 1)]
    #[case("b12-03", "B", "B12", 3)]
    #[case("Rack Z7-10 top", "Z", "Z7", 10)]
    fn standard_labels(
        #[case] raw: &str,
        #[case] zone: &str,
        #[case] shelf: &str,
        #[case] level: i32,
    ) {
        let parsed = parse_bin_id(raw);
        assert_eq!(parsed.zone, zone);
        assert_eq!(parsed.shelf, shelf);
        assert_eq!(parsed.level, level);
        assert_eq!(parsed.zone_type, ZoneType::Standard);
    }

    #[rstest]
    #[case("OB_Cutsize", "Cutsize", "Cutsize")]
    #[case("OB_Cutsize 2", "Cutsize", "Cutsize 2")]
    #[case("sample damage", "Sample/Damage", "Sample/Damage")]
    #[case("SAMPLE/DAMAGE-3", "Sample/Damage", "Sample/Damage 3")]
    #[case("e com", "E-Com", "E-Com")]
    #[case("OB_FolioPallet1", "Folio Pallet", "Folio Pallet 1")]
    #[case("Consignment", "Consignment", "Consignment")]
    #[case("Folio Full Pallet", "Folio Pallet", "Folio Pallet")]
    #[case("folio-full-pallet 4", "Folio Pallet", "Folio Pallet 4")]
    #[case("Cutsize-1-2", "Cutsize", "Cutsize 1")]
    #[case("OB_Event", "Event", "Event")]
    fn special_labels(#[case] raw: &str, #[case] zone: &str, #[case] shelf: &str) {
        let parsed = parse_bin_id(raw);
        assert_eq!(parsed.zone, zone);
        assert_eq!(parsed.shelf, shelf);
        assert_eq!(parsed.level, 0);
        assert_eq!(parsed.zone_type, ZoneType::Special);
    }

    #[test]
    fn special_marker_beats_standard_pattern() {
        let parsed = parse_bin_id("Premium A1-2");
        assert_eq!(parsed.zone, "Premium");
        assert_eq!(parsed.level, 0);
    }

    #[rstest]
    #[case("Prevent A1-1")]
    #[case("Eventual A1-1")]
    #[case("Precutsize A1-1")]
    fn markers_inside_words_are_ignored(#[case] raw: &str) {
        let parsed = parse_bin_id(raw);
        assert_eq!(parsed.zone, "A");
        assert_eq!(parsed.zone_type, ZoneType::Standard);
    }

    #[test]
    fn unmatched_label_falls_back_to_unknown() {
        let parsed = parse_bin_id("  Dock door 4 ");
        assert_eq!(parsed.zone, UNKNOWN_ZONE);
        assert_eq!(parsed.shelf, "Dock door 4");
        assert_eq!(parsed.level, 0);
    }

    #[test]
    fn oversized_level_falls_back() {
        let parsed = parse_bin_id("A1-99999999999");
        assert_eq!(parsed.zone, UNKNOWN_ZONE);
    }

    #[test]
    fn zone_sort_order_groups() {
        assert_eq!(zone_sort_order("A"), 1);
        assert_eq!(zone_sort_order("Z"), 26);
        assert_eq!(zone_sort_order("Sample/Damage"), 100);
        assert_eq!(zone_sort_order("Consignment"), 109);
        assert_eq!(zone_sort_order(UNKNOWN_ZONE), 999);
        assert!(zone_sort_order("C") < zone_sort_order("Cutsize"));
    }
}
