//! Card records and display helpers.
//!
//! A `CardRecord` carries its sensitive fields (number, expiry, security
//! code) as opaque strings. At rest and on the wire to storage those
//! strings hold field-cipher blobs; inside cache entries and export
//! payloads they hold plaintext. Non-sensitive fields (issuer, color,
//! note, tags) are always plaintext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CARD_COLOR: &str = "#2196F3";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardRecord {
    pub id: String,
    pub card_number: String,
    pub expiry_date: String,
    pub security_code: String,
    pub card_type: String,
    pub issuer: String,
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default = "default_color")]
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_color() -> String {
    DEFAULT_CARD_COLOR.to_string()
}

impl CardRecord {
    /// Build a record with a fresh id, current timestamps, and an
    /// issuer-derived color. Sensitive fields are taken as plaintext.
    pub fn new(
        card_number: impl Into<String>,
        expiry_date: impl Into<String>,
        security_code: impl Into<String>,
        card_type: impl Into<String>,
        issuer: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        let issuer = issuer.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            card_number: card_number.into(),
            expiry_date: expiry_date.into(),
            security_code: security_code.into(),
            card_type: card_type.into(),
            color: default_color_for_issuer(&issuer).to_string(),
            issuer,
            owner: owner.into(),
            tags: Vec::new(),
            note: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Digits-only normalization of the card number, used for duplicate
    /// detection. Only meaningful on a record holding plaintext.
    pub fn fingerprint(&self) -> String {
        digits_only(&self.card_number)
    }

    /// First four and last four digits, with shorter fallbacks for short
    /// numbers. Safe to show while the number itself stays hidden.
    pub fn masked_number(&self) -> String {
        let clean = digits_only(&self.card_number);
        match clean.len() {
            n if n >= 12 => format!("{} **** **** {}", &clean[..4], &clean[n - 4..]),
            n if n >= 8 => format!("{} **** {}", &clean[..4], &clean[n - 4..]),
            n if n >= 6 => format!("{} **", &clean[..4]),
            n if n >= 4 => clean[..4].to_string(),
            _ => "****".to_string(),
        }
    }

    /// MMYY stored form rendered as MM/YY.
    pub fn formatted_expiry(&self) -> String {
        if self.expiry_date.len() >= 4 {
            format!("{}/{}", &self.expiry_date[..2], &self.expiry_date[2..])
        } else {
            self.expiry_date.clone()
        }
    }

    pub fn network(&self) -> &'static str {
        network_from_number(&self.card_number)
    }
}

pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Payment network inferred from the leading digit.
pub fn network_from_number(number: &str) -> &'static str {
    let clean = digits_only(number);
    match clean.chars().next() {
        Some('4') => "Visa",
        Some('5') | Some('2') => "Mastercard",
        Some('3') => "American Express",
        Some('6') => "Discover",
        _ => "Unknown",
    }
}

pub fn default_color_for_issuer(issuer: &str) -> &'static str {
    match issuer {
        "Visa" => "#1A1F71",
        "Mastercard" => "#EB001B",
        "American Express" => "#006FCF",
        "Discover" => "#FF6000",
        "RuPay" => "#E31837",
        "Diners Club" => "#0079BE",
        "JCB" => "#0B4EA2",
        "UnionPay" => "#E31837",
        _ => DEFAULT_CARD_COLOR,
    }
}

/// Fix up a possibly missing or malformed display color: empty falls back
/// to the issuer default, a bare hex value gains its `#`, anything that is
/// not 7 chars long falls back to the issuer default.
pub fn normalize_color(color: &str, issuer: &str) -> String {
    if color.is_empty() {
        return default_color_for_issuer(issuer).to_string();
    }
    let candidate = if color.starts_with('#') {
        color.to_string()
    } else {
        format!("#{color}")
    };
    if candidate.len() == 7 {
        candidate
    } else {
        default_color_for_issuer(issuer).to_string()
    }
}

/// Luhn checksum over a digits-only card number. Exposed for UI-side
/// hints; the import reconciler intentionally does not enforce it.
pub fn luhn_valid(number: &str) -> bool {
    let clean = digits_only(number);
    if clean.is_empty() {
        return false;
    }
    let mut sum = 0u32;
    let mut alternate = false;
    for c in clean.chars().rev() {
        let mut n = c.to_digit(10).unwrap_or(0);
        if alternate {
            n *= 2;
            if n > 9 {
                n = (n % 10) + 1;
            }
        }
        sum += n;
        alternate = !alternate;
    }
    sum % 10 == 0
}
