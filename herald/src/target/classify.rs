//! Classification of untyped address strings.

use std::sync::OnceLock;

use regex::Regex;

use super::{CategoryKey, TargetCategory};

/// Label of the custom bucket that collects unclassifiable addresses.
pub const OTHER_LABEL: &str = "other";

/// Prefix that turns an entity-like id into a person id.
pub const PERSON_PREFIX: &str = "person.";

/// Prefix of channel-action (mobile app) ids.
pub const MOBILE_APP_PREFIX: &str = "mobile_app_";

fn device_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{32}$").unwrap())
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap()
    })
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_]+\.[A-Za-z0-9_]+$").unwrap())
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9][0-9 ().\-]{5,}[0-9]$").unwrap())
}

/// Check whether a string looks like a phone number.
///
/// Deliberately loose: optional leading `+`, common separators, and
/// between 7 and 15 digits overall.
pub fn is_phone(value: &str) -> bool {
    if !phone_regex().is_match(value) {
        return false;
    }
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
}

pub fn is_email(value: &str) -> bool {
    email_regex().is_match(value)
}

pub fn is_device_id(value: &str) -> bool {
    device_regex().is_match(value)
}

pub fn is_entity_like(value: &str) -> bool {
    entity_regex().is_match(value)
}

/// Work out which bucket an untyped address belongs in.
pub fn classify(value: &str) -> CategoryKey {
    if is_device_id(value) {
        CategoryKey::Known(TargetCategory::Device)
    } else if is_email(value) {
        CategoryKey::Known(TargetCategory::Email)
    } else if value.starts_with(PERSON_PREFIX) && is_entity_like(value) {
        CategoryKey::Known(TargetCategory::Person)
    } else if value.starts_with(MOBILE_APP_PREFIX) {
        CategoryKey::Known(TargetCategory::MobileApp)
    } else if is_entity_like(value) {
        CategoryKey::Known(TargetCategory::Entity)
    } else if is_phone(value) {
        CategoryKey::Known(TargetCategory::Phone)
    } else {
        CategoryKey::Custom(OTHER_LABEL.to_string())
    }
}
