//! Boundary normalization for user-supplied text.
//!
//! Every string that crosses into the database goes through one of these
//! helpers so that comparisons (emails, coupon codes, postal codes) work
//! on canonical forms.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Particles kept lowercase when title-casing Italian names and cities.
const LOWER_WORDS: &[&str] = &[
    "di", "da", "del", "della", "dei", "degli", "delle", "e", "a", "al", "alla", "alle", "ai",
    "agli", "in", "su",
];

static COUPON_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").unwrap());

/// Trailing house number at the end of a street line, e.g. "Via Roma, 12b".
static STREET_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)[,\s]+(\d+[A-Za-z]?)$").unwrap());

/// Collapses internal whitespace runs to single spaces and trims the ends.
pub fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercases then capitalizes each word, leaving Italian particles alone.
pub fn title_case(s: &str) -> String {
    let cleaned = collapse_spaces(s).to_lowercase();
    if cleaned.is_empty() {
        return cleaned;
    }
    cleaned
        .split(' ')
        .map(|w| {
            if LOWER_WORDS.contains(&w) {
                w.to_string()
            } else {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_email(email: &str) -> String {
    collapse_spaces(email).to_lowercase()
}

/// Strips every non-digit character.
pub fn normalize_postal_code(code: &str) -> String {
    code.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Uppercased, trimmed coupon code; `None` when it fails the code shape.
pub fn normalize_coupon_code(code: &str) -> Option<String> {
    let upper = collapse_spaces(code).to_uppercase();
    if COUPON_CODE_RE.is_match(&upper) {
        Some(upper)
    } else {
        None
    }
}

/// Canonical product slug: trimmed and lowercased.
pub fn normalize_slug(slug: &str) -> String {
    collapse_spaces(slug).to_lowercase()
}

/// Address snapshot shape stored on orders and exchanged over the API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub street_number: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
}

impl ShippingAddress {
    /// True when the fields required to ship something are all present.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty()
            && !self.surname.is_empty()
            && !self.street.is_empty()
            && !self.city.is_empty()
            && !self.postal_code.is_empty()
    }
}

/// Normalizes every field and, when no explicit street number was given,
/// splits a trailing house number off the street line.
pub fn normalize_shipping_address(addr: &ShippingAddress) -> ShippingAddress {
    let mut street = collapse_spaces(&addr.street);
    let mut street_number = collapse_spaces(&addr.street_number);

    if street_number.is_empty() {
        if let Some(caps) = STREET_NUMBER_RE.captures(&street) {
            let head = collapse_spaces(caps.get(1).map_or("", |m| m.as_str()));
            let num = collapse_spaces(caps.get(2).map_or("", |m| m.as_str()));
            if !head.is_empty() {
                street = head;
                street_number = num;
            }
        }
    }

    ShippingAddress {
        name: title_case(&addr.name),
        surname: title_case(&addr.surname),
        phone: collapse_spaces(&addr.phone),
        email: normalize_email(&addr.email),
        street,
        street_number,
        city: title_case(&addr.city),
        postal_code: normalize_postal_code(&addr.postal_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_spaces_flattens_runs() {
        assert_eq!(collapse_spaces("  via   roma \t 1 "), "via roma 1");
        assert_eq!(collapse_spaces(""), "");
    }

    #[test]
    fn title_case_keeps_particles_lower() {
        assert_eq!(title_case("MARIO  ROSSI"), "Mario Rossi");
        assert_eq!(title_case("reggio di calabria"), "Reggio di Calabria");
        assert_eq!(title_case("sant'agata dei goti"), "Sant'agata dei Goti");
    }

    #[test]
    fn coupon_codes_are_uppercased_and_shape_checked() {
        assert_eq!(
            normalize_coupon_code(" welcome-10 "),
            Some("WELCOME-10".to_string())
        );
        assert_eq!(normalize_coupon_code("ab"), None);
        assert_eq!(normalize_coupon_code("bad code"), None);
        assert_eq!(normalize_coupon_code(&"X".repeat(33)), None);
    }

    #[test]
    fn postal_code_keeps_digits_only() {
        assert_eq!(normalize_postal_code(" 001-44 "), "00144");
        assert_eq!(normalize_postal_code("abc"), "");
    }

    #[test]
    fn street_number_is_split_off_when_missing() {
        let addr = ShippingAddress {
            name: "mario".into(),
            surname: "rossi".into(),
            street: "Via Roma, 12B".into(),
            city: "milano".into(),
            postal_code: "20100".into(),
            ..Default::default()
        };
        let norm = normalize_shipping_address(&addr);
        assert_eq!(norm.street, "Via Roma");
        assert_eq!(norm.street_number, "12B");
        assert_eq!(norm.city, "Milano");
    }

    #[test]
    fn explicit_street_number_wins_over_splitting() {
        let addr = ShippingAddress {
            street: "Via Roma 12".into(),
            street_number: "7".into(),
            ..Default::default()
        };
        let norm = normalize_shipping_address(&addr);
        assert_eq!(norm.street, "Via Roma 12");
        assert_eq!(norm.street_number, "7");
    }
}
