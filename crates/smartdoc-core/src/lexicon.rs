//! Fixed technical lexicons and lexical heuristics over queries and vision
//! analyses.
//!
//! Query matching is token-based: a query is split into lowercase
//! alphanumeric runs, and a term matches a token equal to it or to its
//! plural (`pin` matches `pins`). This avoids `pin` firing on `spinning`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

/// Terms that flag a query as schematic-related.
pub const SCHEMATIC_TERMS: &[&str] = &[
    "pin",
    "pinout",
    "schematic",
    "diagram",
    "circuit",
    "gpio",
    "spi",
    "i2c",
    "uart",
    "mosi",
    "miso",
    "sck",
    "scl",
    "sda",
    "wiring",
    "connection",
    "power",
    "voltage",
    "vcc",
    "gnd",
];

/// Topics whose reanalysis is always worth persisting.
pub const IMPORTANT_TOPICS: &[&str] = &[
    "pinout",
    "connection",
    "power",
    "voltage",
    "gpio",
    "spi",
    "i2c",
    "uart",
    "schematic",
    "diagram",
    "wiring",
];

/// Terms used to focus the vision prompt and to check that an analysis
/// answers the question.
pub const FOCUS_TERMS: &[&str] = &[
    "spi", "mosi", "miso", "sck", "i2c", "scl", "sda", "twi", "uart", "serial", "tx", "rx",
    "power", "vcc", "gnd", "voltage", "pin", "pinout", "gpio", "adc", "dac", "pwm", "timer",
];

const PROTOCOLS: &[&str] = &["spi", "i2c", "uart", "pwm", "adc", "dac"];

const PIN_VOCABULARY: &[&str] = &["pin", "pinout", "gpio", "port"];

/// Lowercase alphanumeric tokens, deduplicated.
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn token_matches(token: &str, term: &str) -> bool {
    token == term || token.strip_suffix('s') == Some(term)
}

/// Lexicon terms present in `text`, in lexicon order.
pub fn matched_terms(text: &str, lexicon: &[&'static str]) -> Vec<&'static str> {
    let toks = tokens(text);
    lexicon
        .iter()
        .copied()
        .filter(|term| toks.iter().any(|t| token_matches(t, term)))
        .collect()
}

/// Whether a query is about pins, buses, power, or wiring.
pub fn is_schematic_query(query: &str) -> bool {
    !matched_terms(query, SCHEMATIC_TERMS).is_empty()
}

pub fn touches_important_topic(query: &str) -> bool {
    !matched_terms(query, IMPORTANT_TOPICS).is_empty()
}

pub fn focus_terms(query: &str) -> Vec<&'static str> {
    matched_terms(query, FOCUS_TERMS)
}

fn keyed_pin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][A-Z0-9_/]+)\s*[:=]\s*([A-Z]?[0-9]{1,3})\b")
            .expect("valid keyed pin regex pattern")
    })
}

fn name_to_pin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][A-Z0-9_/]+)\s*[:=\-]?\s*[Pp]in\s+([0-9]{1,3})\b")
            .expect("valid name-to-pin regex pattern")
    })
}

fn pin_to_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[Pp]in\s+([0-9]{1,3})\s*[:=\-]\s*([A-Z][A-Z0-9_/]+)")
            .expect("valid pin-to-name regex pattern")
    })
}

fn component_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z]{2,}[0-9]{2,}[A-Z0-9]*)\b").expect("valid component regex pattern")
    })
}

fn pin_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z]?[0-9]{1,2}\b").expect("valid pin number regex pattern"))
}

/// Keyed signal → pin mappings such as `MOSI: D11`, `SCK - Pin 13`, or
/// `Pin 12: MISO`.
pub fn extract_pin_mappings(text: &str) -> BTreeMap<String, String> {
    let mut pins = BTreeMap::new();
    for caps in keyed_pin_regex().captures_iter(text) {
        pins.insert(caps[1].to_string(), caps[2].to_string());
    }
    for caps in name_to_pin_regex().captures_iter(text) {
        pins.entry(caps[1].to_string())
            .or_insert_with(|| caps[2].to_string());
    }
    for caps in pin_to_name_regex().captures_iter(text) {
        pins.entry(caps[2].to_string())
            .or_insert_with(|| caps[1].to_string());
    }
    pins
}

/// Part identifiers shaped like `ATMEGA328P` or `CH340`, sorted and
/// deduplicated.
pub fn extract_components(text: &str) -> Vec<String> {
    let found: BTreeSet<String> = component_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect();
    found.into_iter().collect()
}

/// At least two markdown-style table rows.
fn has_table(text: &str) -> bool {
    text.lines()
        .filter(|line| line.matches('|').count() >= 2)
        .count()
        >= 2
}

/// Whether the analysis carries tabular or keyed pin/component mappings.
pub fn has_structured_data(text: &str) -> bool {
    extract_pin_mappings(text).len() >= 2 || has_table(text)
}

/// Lexical confidence estimate for a vision analysis.
///
/// Starts at 0.5 and adds for pin vocabulary, pin numbers, protocol names,
/// and for mentioning the query's own focus terms. Terms match whole
/// tokens, as in [`matched_terms`]. Capped at 1.0.
pub fn estimate_analysis_confidence(text: &str, query: &str) -> f64 {
    let toks = tokens(text);
    let mentions = |term: &str| toks.iter().any(|t| token_matches(t, term));
    let mut confidence: f64 = 0.5;

    if PIN_VOCABULARY.iter().any(|t| mentions(*t)) {
        confidence += 0.1;
    }
    if pin_number_regex().is_match(text) {
        confidence += 0.15;
    }
    if PROTOCOLS.iter().any(|p| mentions(*p)) {
        confidence += 0.1;
    }
    let wanted = focus_terms(query);
    if !wanted.is_empty() && wanted.iter().any(|t| mentions(*t)) {
        confidence += 0.15;
    }

    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schematic_query_detection() {
        assert!(is_schematic_query("What are the SPI pins on the Nano R4?"));
        assert!(is_schematic_query("gpio layout"));
        assert!(is_schematic_query("I2C address"));
        assert!(is_schematic_query("Wiring the display"));
        assert!(!is_schematic_query("How do I install the toolchain?"));
    }

    #[test]
    fn test_token_match_not_substring() {
        assert!(!is_schematic_query("spinning up a server"));
        assert!(is_schematic_query("which pins"));
    }

    #[test]
    fn test_important_topics() {
        assert!(touches_important_topic("Nano pinout"));
        assert!(touches_important_topic("power connections"));
        assert!(!touches_important_topic("which pin is the LED on"));
    }

    #[test]
    fn test_pin_mappings_keyed() {
        let text = "SPI mapping:\nMOSI: D11\nMISO: D12\nSCK = D13\nCS: D10";
        let pins = extract_pin_mappings(text);
        assert_eq!(pins.get("MOSI").map(String::as_str), Some("D11"));
        assert_eq!(pins.get("SCK").map(String::as_str), Some("D13"));
        assert_eq!(pins.len(), 4);
    }

    #[test]
    fn test_pin_mappings_pin_forms() {
        let pins = extract_pin_mappings("SDA - Pin 18 and Pin 19: SCL");
        assert_eq!(pins.get("SDA").map(String::as_str), Some("18"));
        assert_eq!(pins.get("SCL").map(String::as_str), Some("19"));
    }

    #[test]
    fn test_structured_data() {
        assert!(has_structured_data("MOSI: D11\nMISO: D12"));
        assert!(has_structured_data("| Pin | Function |\n|-----|----------|\n| 11 | MOSI |"));
        assert!(!has_structured_data("The diagram shows a generic board outline."));
    }

    #[test]
    fn test_components() {
        let parts = extract_components("Uses an ATMEGA328P and a CH340 bridge, plus an ATMEGA328P");
        assert_eq!(parts, vec!["ATMEGA328P".to_string(), "CH340".to_string()]);
    }

    #[test]
    fn test_confidence_estimate() {
        let vague = estimate_analysis_confidence("A drawing of a board.", "spi pins");
        assert!((vague - 0.5).abs() < 1e-9);

        let specific = estimate_analysis_confidence(
            "SPI pins: MOSI on pin D11, MISO on D12, SCK on D13.",
            "spi pins",
        );
        assert!((specific - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_estimate_matches_whole_tokens() {
        let text = "Spinning the context report raised headcount questions.";
        let c = estimate_analysis_confidence(text, "tx adc pin");
        assert!((c - 0.5).abs() < 1e-9);

        let c = estimate_analysis_confidence("See the pinout near the header.", "tx adc");
        assert!((c - 0.6).abs() < 1e-9);
    }
}
