//! Property-based tests for bin label parsing and CSV row mapping.

use binstock_api::{
    entities::zone::ZoneType,
    services::{
        bin_parser::{parse_bin_id, zone_sort_order, SPECIAL_ZONES, UNKNOWN_ZONE},
        csv_import::parse_csv,
    },
};
use proptest::prelude::*;

fn standard_label() -> impl Strategy<Value = (char, u32, u32)> {
    (prop::char::range('A', 'Z'), 1u32..100, 0u32..50)
}

fn separator() -> impl Strategy<Value = String> {
    "[ _/-]{1,3}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn parsing_is_deterministic(raw in "\\PC{0,24}") {
        prop_assert_eq!(parse_bin_id(&raw), parse_bin_id(&raw));
    }

    #[test]
    fn standard_labels_round_trip((letter, shelf, level) in standard_label(), lower in any::<bool>()) {
        let label = format!("{}{}-{}", letter, shelf, level);
        let label = if lower { label.to_lowercase() } else { label };
        let parsed = parse_bin_id(&label);
        prop_assert_eq!(parsed.zone, letter.to_string());
        prop_assert_eq!(parsed.zone_type, ZoneType::Standard);
        prop_assert_eq!(parsed.shelf, format!("{}{}", letter, shelf));
        prop_assert_eq!(parsed.level, level as i32);
    }

    #[test]
    fn special_marker_beats_standard_pattern(
        idx in 0..SPECIAL_ZONES.len(),
        (letter, shelf, level) in standard_label(),
        sep in separator(),
        upper in any::<bool>(),
    ) {
        let marker = SPECIAL_ZONES[idx];
        let marker = if upper { marker.to_uppercase() } else { marker.to_lowercase() };
        let label = format!("{}{}{} {}{}-{}", "OB", sep, marker, letter, shelf, level);
        let parsed = parse_bin_id(&label);
        prop_assert_eq!(parsed.zone_type, ZoneType::Special);
        prop_assert_eq!(parsed.zone.as_str(), SPECIAL_ZONES[idx]);
        prop_assert_eq!(parsed.level, 0);
    }

    #[test]
    fn unmatched_labels_keep_their_text(raw in "[0-9 ]{1,12}") {
        let parsed = parse_bin_id(&raw);
        prop_assert_eq!(parsed.zone.as_str(), UNKNOWN_ZONE);
        prop_assert_eq!(parsed.shelf, raw.trim().to_string());
    }

    #[test]
    fn zone_order_puts_letters_first(letter in prop::char::range('A', 'Z'), idx in 0..SPECIAL_ZONES.len()) {
        let letter_order = zone_sort_order(&letter.to_string());
        let special_order = zone_sort_order(SPECIAL_ZONES[idx]);
        prop_assert!(letter_order < special_order);
        prop_assert!(special_order < zone_sort_order(UNKNOWN_ZONE));
    }

    #[test]
    fn every_nonblank_row_is_counted(rows in prop::collection::vec(("[A-C][1-9]-[1-9]", "P-[0-9]{3}", 0u32..500), 1..40)) {
        let mut csv = String::from("Bin ID,Product Code,Quantity\n");
        for (bin, code, qty) in &rows {
            csv.push_str(&format!("{},{},{}\n", bin, code, qty));
        }
        let parsed = parse_csv(&csv).unwrap();
        prop_assert_eq!(parsed.rows_total, rows.len());
        prop_assert_eq!(parsed.rows_skipped, 0);
        prop_assert_eq!(parsed.rows.len(), rows.len());
    }
}
