//! Categorized address sets.
//!
//! A [`Target`] holds one ordered, de-duplicated list of addresses per
//! category. Direct categories (devices, entities, e-mail, phone, mobile app
//! ids and custom labels) are understood by transports; indirect categories
//! (people, areas, floors, labels) have to be resolved away before a
//! transport sees them.
//!
//! Targets are cheap, short-lived values: a single resolution pass creates
//! and combines many of them with `+`, `-`, [`Target::direct`] and
//! [`Target::split_by_target_data`].

mod classify;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub use classify::{MOBILE_APP_PREFIX, OTHER_LABEL, PERSON_PREFIX, classify};

/// Free-form payload attached to a target or to individual addresses.
pub type TargetData = Map<String, Value>;

/// The known address categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCategory {
    Device,
    Entity,
    Email,
    Phone,
    MobileApp,
    Person,
    Area,
    Floor,
    Label,
}

impl TargetCategory {
    pub const ALL: [TargetCategory; 9] = [
        Self::Device,
        Self::Entity,
        Self::Email,
        Self::Phone,
        Self::MobileApp,
        Self::Person,
        Self::Area,
        Self::Floor,
        Self::Label,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Entity => "entity",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::MobileApp => "mobile_app",
            Self::Person => "person",
            Self::Area => "area",
            Self::Floor => "floor",
            Self::Label => "label",
        }
    }

    /// Parse a category label, accepting the `_id` suffixed spellings too.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        let normalized = normalized.strip_suffix("_id").unwrap_or(normalized.as_str());
        Self::ALL.into_iter().find(|c| c.label() == normalized)
    }

    /// Whether transports can address this category without resolution.
    pub fn is_direct(&self) -> bool {
        !matches!(self, Self::Person | Self::Area | Self::Floor | Self::Label)
    }
}

/// Key of one address bucket: a known category or a custom label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CategoryKey {
    Known(TargetCategory),
    Custom(String),
}

impl CategoryKey {
    pub fn from_label(label: &str) -> Self {
        match TargetCategory::from_label(label) {
            Some(category) => Self::Known(category),
            None => Self::Custom(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Known(category) => category.label(),
            Self::Custom(label) => label,
        }
    }

    pub fn is_direct(&self) -> bool {
        match self {
            Self::Known(category) => category.is_direct(),
            Self::Custom(_) => true,
        }
    }
}

impl From<TargetCategory> for CategoryKey {
    fn from(category: TargetCategory) -> Self {
        Self::Known(category)
    }
}

/// A categorized, de-duplicated set of addresses.
///
/// Within a category the first occurrence of an address wins and order of
/// first insertion is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    buckets: BTreeMap<CategoryKey, Vec<String>>,
    data: Option<TargetData>,
    address_data: BTreeMap<(CategoryKey, String), TargetData>,
}

impl Target {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a target from a scalar, list, or category-keyed map.
    ///
    /// Never fails: untyped strings are classified, numbers stringified and
    /// anything else ignored.
    pub fn from_value(value: &Value) -> Self {
        let mut target = Self::new();
        target.absorb_value(value);
        target
    }

    /// Build a target from untyped addresses.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut target = Self::new();
        for address in addresses {
            let address = address.as_ref().trim();
            target.push(classify(address), address);
        }
        target
    }

    /// Build a target holding the given addresses in a single category.
    pub fn with_category<I, S>(category: impl Into<CategoryKey>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = category.into();
        let mut target = Self::new();
        for address in addresses {
            target.push(key.clone(), address.as_ref());
        }
        target
    }

    fn absorb_value(&mut self, value: &Value) {
        match value {
            Value::String(s) => {
                let s = s.trim();
                self.push(classify(s), s);
            }
            Value::Number(n) => {
                let s = n.to_string();
                self.push(classify(&s), &s);
            }
            Value::Array(items) => {
                for item in items {
                    self.absorb_value(item);
                }
            }
            Value::Object(map) => {
                for (label, entries) in map {
                    let key = CategoryKey::from_label(label);
                    for address in scalar_strings(entries) {
                        self.push(key.clone(), &address);
                    }
                }
            }
            Value::Null | Value::Bool(_) => {}
        }
    }

    /// Add one address; returns false if it was empty or already present.
    pub fn push(&mut self, key: CategoryKey, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }
        let list = self.buckets.entry(key).or_default();
        if list.iter().any(|a| a == address) {
            return false;
        }
        list.push(address.to_string());
        true
    }

    /// Addresses of a known category.
    pub fn category(&self, category: TargetCategory) -> &[String] {
        self.buckets
            .get(&CategoryKey::Known(category))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Addresses under a label: the known category, or the custom bucket of
    /// that name.
    pub fn for_category(&self, label: &str) -> &[String] {
        self.buckets
            .get(&CategoryKey::from_label(label))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn person_ids(&self) -> &[String] {
        self.category(TargetCategory::Person)
    }

    /// Iterate `(category, address)` pairs in category order.
    pub fn addresses(&self) -> impl Iterator<Item = (&CategoryKey, &str)> {
        self.buckets
            .iter()
            .flat_map(|(key, list)| list.iter().map(move |a| (key, a.as_str())))
    }

    /// True iff any direct category holds an address.
    pub fn has_resolved_target(&self) -> bool {
        self.buckets
            .iter()
            .any(|(key, list)| key.is_direct() && !list.is_empty())
    }

    pub fn has_indirect(&self) -> bool {
        self.buckets
            .iter()
            .any(|(key, list)| !key.is_direct() && !list.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    /// Total number of addresses across all categories.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn contains(&self, key: &CategoryKey, address: &str) -> bool {
        self.buckets
            .get(key)
            .is_some_and(|list| list.iter().any(|a| a == address))
    }

    /// Copy with every indirect category dropped.
    pub fn direct(&self) -> Target {
        let mut direct = self.clone();
        direct.retain(|key, _| key.is_direct());
        direct
    }

    /// Keep only the addresses matching the predicate.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&CategoryKey, &str) -> bool,
    {
        for (key, list) in self.buckets.iter_mut() {
            list.retain(|a| keep(key, a));
        }
        self.buckets.retain(|_, list| !list.is_empty());
        let buckets = &self.buckets;
        self.address_data.retain(|(key, address), _| {
            buckets
                .get(key)
                .is_some_and(|list| list.iter().any(|a| a == address))
        });
    }

    /// Remove an address from every category it appears in.
    pub fn remove_address(&mut self, address: &str) {
        self.retain(|_, a| a != address);
    }

    /// Payload shared by the whole target.
    pub fn data(&self) -> Option<&TargetData> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: Option<TargetData>) {
        self.data = data;
    }

    pub fn with_data(mut self, data: TargetData) -> Self {
        self.data = Some(data);
        self
    }

    /// Move the shared payload onto each address as target-specific data.
    ///
    /// Addresses carrying their own payload are kept apart from the rest
    /// when the target is split or unioned with others.
    pub fn into_target_specific(mut self) -> Self {
        if let Some(data) = self.data.take() {
            let keys: Vec<(CategoryKey, String)> = self
                .addresses()
                .map(|(key, address)| (key.clone(), address.to_string()))
                .collect();
            for key in keys {
                self.address_data.insert(key, data.clone());
            }
        }
        self
    }

    /// Whether any address carries target-specific data.
    pub fn has_target_data(&self) -> bool {
        !self.address_data.is_empty()
    }

    /// Payload of the first address carrying target-specific data.
    ///
    /// For targets produced by [`Target::split_by_target_data`] this is the
    /// payload shared by every address.
    pub fn target_data(&self) -> Option<&TargetData> {
        self.addresses()
            .find_map(|(key, address)| self.address_data.get(&(key.clone(), address.to_string())))
    }

    /// Union in place. The right-hand side wins on payload conflicts.
    pub fn extend(&mut self, other: &Target) {
        for (key, address) in other.addresses() {
            self.push(key.clone(), address);
        }
        for (key, data) in &other.address_data {
            self.address_data.insert(key.clone(), data.clone());
        }
        if let Some(other_data) = &other.data {
            let data = self.data.get_or_insert_with(Map::new);
            for (k, v) in other_data {
                data.insert(k.clone(), v.clone());
            }
        }
    }

    /// Difference in place: drop every address present in `other`.
    pub fn remove(&mut self, other: &Target) {
        self.retain(|key, address| !other.contains(key, address));
    }

    /// Partition into one target per distinct target-specific payload, plus
    /// one target for the addresses without one.
    ///
    /// Empty partitions are omitted, so an empty target splits into nothing.
    pub fn split_by_target_data(&self) -> Vec<Target> {
        let mut general = Target {
            data: self.data.clone(),
            ..Target::default()
        };
        let mut groups: Vec<(TargetData, Target)> = Vec::new();

        for (key, address) in self.addresses() {
            let lookup = (key.clone(), address.to_string());
            match self.address_data.get(&lookup) {
                None => {
                    general.push(key.clone(), address);
                }
                Some(payload) => {
                    let index = match groups.iter().position(|(p, _)| p == payload) {
                        Some(index) => index,
                        None => {
                            groups.push((payload.clone(), Target::new()));
                            groups.len() - 1
                        }
                    };
                    let group = &mut groups[index].1;
                    group.push(key.clone(), address);
                    group.address_data.insert(lookup, payload.clone());
                }
            }
        }

        let mut parts = Vec::with_capacity(groups.len() + 1);
        if !general.is_empty() {
            parts.push(general);
        }
        parts.extend(groups.into_iter().map(|(_, target)| target));
        parts
    }

    /// One target per address, each carrying its payloads.
    pub fn split_by_address(&self) -> Vec<Target> {
        self.addresses()
            .map(|(key, address)| {
                let mut single = Target {
                    data: self.data.clone(),
                    ..Target::default()
                };
                single.push(key.clone(), address);
                let lookup = (key.clone(), address.to_string());
                if let Some(payload) = self.address_data.get(&lookup) {
                    single.address_data.insert(lookup, payload.clone());
                }
                single
            })
            .collect()
    }
}

fn scalar_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(scalar_strings).collect(),
        _ => Vec::new(),
    }
}

impl Add<&Target> for &Target {
    type Output = Target;

    fn add(self, rhs: &Target) -> Target {
        let mut result = self.clone();
        result.extend(rhs);
        result
    }
}

impl Sub<&Target> for &Target {
    type Output = Target;

    fn sub(self, rhs: &Target) -> Target {
        let mut result = self.clone();
        result.remove(rhs);
        result
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, list) in &self.buckets {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}:[{}]", key.label(), list.join(","))?;
        }
        if first {
            write!(f, "<empty>")?;
        }
        Ok(())
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (key, list) in &self.buckets {
            map.serialize_entry(key.label(), list)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Target::from_value(&value))
    }
}

impl From<&str> for Target {
    fn from(address: &str) -> Self {
        Target::from_addresses([address])
    }
}
