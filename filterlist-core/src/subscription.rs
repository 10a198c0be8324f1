//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! The subscription data model: the ordered filter list, the id-keyed
//! process-wide registry that enforces "at most one live subscription per
//! id", the downloadable/user-defined split, and property
//! serialization/deserialization.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::filter::Filter;
use crate::filter::FilterKind;
use crate::notifier::notifier;
use crate::notifier::FilterTopic;
use crate::notifier::SubscriptionTopic;
use crate::text::LexicalCast;

/// A single `key=value` property, as produced by the parser or handed in
/// directly by a caller constructing a subscription from scratch.
pub type KeyValue = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionType {
    Downloadable,
    UserDefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Defaults {
    pub blocking: bool,
    pub whitelist: bool,
    pub elemhide: bool,
}

const DEFAULT_BLOCKING: u8 = 0b001;
const DEFAULT_WHITELIST: u8 = 0b010;
const DEFAULT_ELEMHIDE: u8 = 0b100;

impl Defaults {
    fn from_bits(bits: u8) -> Self {
        Defaults {
            blocking: bits & DEFAULT_BLOCKING != 0,
            whitelist: bits & DEFAULT_WHITELIST != 0,
            elemhide: bits & DEFAULT_ELEMHIDE != 0,
        }
    }
}

#[derive(Debug)]
enum Variant {
    Downloadable,
    UserDefined { defaults: AtomicU8 },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("operation is only valid on a user-defined subscription")]
    NotUserDefined,
}

#[derive(Debug)]
pub struct Subscription {
    id: String,
    title: ArcSwap<String>,
    disabled: AtomicBool,
    listed: AtomicBool,
    filters: Mutex<Vec<Arc<Filter>>>,
    variant: Variant,
}

static SUBSCRIPTION_REGISTRY: std::sync::OnceLock<DashMap<String, Weak<Subscription>>> =
    std::sync::OnceLock::new();

fn registry() -> &'static DashMap<String, Weak<Subscription>> {
    SUBSCRIPTION_REGISTRY.get_or_init(DashMap::new)
}

fn find_property<'a>(properties: &'a [KeyValue], key: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn generate_user_id() -> String {
    let mut rng = StdRng::seed_from_u64(registry().len() as u64);
    loop {
        let number: u32 = rng.gen();
        let mut digits = [0u8; 6];
        let mut n = number;
        for d in digits.iter_mut() {
            *d = b'0' + (n % 10) as u8;
            n /= 10;
        }
        let id = format!("~user~{}", std::str::from_utf8(&digits).expect("ASCII digits"));
        if !registry().contains_key(&id) {
            return id;
        }
    }
}

fn parse_defaults(properties: &[KeyValue]) -> u8 {
    let Some(value) = find_property(properties, "defaults") else {
        return 0;
    };
    let mut bits = 0u8;
    for token in value.split(' ').filter(|t| !t.is_empty()) {
        bits |= match token {
            "blocking" => DEFAULT_BLOCKING,
            "whitelist" => DEFAULT_WHITELIST,
            "elemhide" => DEFAULT_ELEMHIDE,
            _ => 0,
        };
    }
    bits
}

fn category_for(kind: FilterKind) -> Option<u8> {
    match kind {
        FilterKind::Blocking => Some(DEFAULT_BLOCKING),
        FilterKind::Whitelist => Some(DEFAULT_WHITELIST),
        k if k.is_elemhide_base() => Some(DEFAULT_ELEMHIDE),
        _ => None,
    }
}

impl Subscription {
    /// Looks up the `"url"` key and delegates to the id-based constructor.
    /// Returns `None` if the key is missing or empty.
    pub fn from_properties(properties: &[KeyValue]) -> Option<Arc<Subscription>> {
        let id = find_property(properties, "url")?;
        if id.is_empty() {
            return None;
        }
        Some(Self::from_properties_with_id(id, properties))
    }

    /// Convenience equivalent to `from_properties_with_id(id, &[])`.
    pub fn from_id(id: &str) -> Arc<Subscription> {
        Self::from_properties_with_id(id, &[])
    }

    fn from_properties_with_id(id: &str, properties: &[KeyValue]) -> Arc<Subscription> {
        if id.is_empty() {
            let generated = generate_user_id();
            return Self::from_properties_with_id(&generated, properties);
        }

        if let Some(existing) = registry().get(id).and_then(|w| w.upgrade()) {
            tracing::trace!(id, "returning already-registered subscription");
            return existing;
        }

        let title = find_property(properties, "title").unwrap_or("").to_string();
        let disabled = find_property(properties, "disabled")
            .map(bool::lexical_cast)
            .unwrap_or(false);

        let variant = if let Some(stripped) = id.strip_prefix('~') {
            let _ = stripped;
            Variant::UserDefined {
                defaults: AtomicU8::new(parse_defaults(properties)),
            }
        } else {
            Variant::Downloadable
        };

        let subscription = Arc::new(Subscription {
            id: id.to_string(),
            title: ArcSwap::from_pointee(title),
            disabled: AtomicBool::new(disabled),
            listed: AtomicBool::new(false),
            filters: Mutex::new(Vec::new()),
            variant,
        });

        let winner = match registry().entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occ) => match occ.get().upgrade() {
                Some(existing) => existing,
                None => {
                    occ.insert(Arc::downgrade(&subscription));
                    subscription
                }
            },
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                vac.insert(Arc::downgrade(&subscription));
                subscription
            }
        };
        tracing::debug!(id = %winner.id, "subscription constructed");
        winner
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sub_type(&self) -> SubscriptionType {
        match self.variant {
            Variant::Downloadable => SubscriptionType::Downloadable,
            Variant::UserDefined { .. } => SubscriptionType::UserDefined,
        }
    }

    pub fn is_user_defined(&self) -> bool {
        matches!(self.variant, Variant::UserDefined { .. })
    }

    /// A user-defined subscription with no default categories set, matching
    /// the reference's `IsGeneric() { return mDefaults == 0; }`. Its
    /// `defaults=` line is suppressed rather than emitted empty.
    fn is_generic(&self) -> bool {
        match &self.variant {
            Variant::UserDefined { defaults } => defaults.load(Ordering::SeqCst) == 0,
            Variant::Downloadable => false,
        }
    }

    pub fn title(&self) -> Arc<String> {
        self.title.load_full()
    }

    pub fn set_title(&self, title: &str) {
        let changed = self.title.load().as_str() != title;
        if changed {
            self.title.store(Arc::new(title.to_string()));
            tracing::trace!(id = %self.id, "title changed");
            notifier().subscription_change(SubscriptionTopic::Title, self);
        }
    }

    pub fn disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn set_disabled(&self, disabled: bool) {
        let changed = self.disabled.swap(disabled, Ordering::SeqCst) != disabled;
        if changed {
            tracing::trace!(id = %self.id, disabled, "disabled changed");
            notifier().subscription_change(SubscriptionTopic::Disabled, self);
        }
    }

    pub fn listed(&self) -> bool {
        self.listed.load(Ordering::SeqCst)
    }

    /// `listed` has no associated notifier topic; this setter never emits.
    pub fn set_listed(&self, listed: bool) {
        self.listed.store(listed, Ordering::SeqCst);
    }

    pub fn filter_count(&self) -> usize {
        self.filters.lock().expect("filters mutex poisoned").len()
    }

    pub fn filter_at(&self, index: usize) -> Option<Arc<Filter>> {
        self.filters.lock().expect("filters mutex poisoned").get(index).cloned()
    }

    pub fn index_of_filter(&self, filter: &Arc<Filter>) -> Option<usize> {
        self.filters
            .lock()
            .expect("filters mutex poisoned")
            .iter()
            .position(|f| Arc::ptr_eq(f, filter))
    }

    pub fn filters(&self) -> Vec<Arc<Filter>> {
        self.filters.lock().expect("filters mutex poisoned").clone()
    }

    /// Appends to the ordered filter list without notification. Used by the
    /// parser during ingest.
    pub fn add_filter(&self, filter: Arc<Filter>) {
        self.filters.lock().expect("filters mutex poisoned").push(filter);
    }

    fn do_serialize_properties(&self) -> String {
        let mut out = String::new();
        out.push_str("url=");
        out.push_str(&self.id);
        out.push('\n');
        let title = self.title.load();
        if !title.is_empty() {
            out.push_str("title=");
            out.push_str(&title);
            out.push('\n');
        }
        if self.disabled() {
            out.push_str("disabled=true\n");
        }
        out
    }

    /// Dispatches on subscription type the way the reference's virtual
    /// `SerializeProperties` does.
    pub fn serialize_properties(&self) -> String {
        let mut out = self.do_serialize_properties();
        if let Variant::UserDefined { defaults } = &self.variant {
            if !self.is_generic() {
                let bits = defaults.load(Ordering::SeqCst);
                out.push_str("defaults=");
                if bits & DEFAULT_BLOCKING != 0 {
                    out.push_str(" blocking");
                }
                if bits & DEFAULT_WHITELIST != 0 {
                    out.push_str(" whitelist");
                }
                if bits & DEFAULT_ELEMHIDE != 0 {
                    out.push_str(" elemhide");
                }
                out.push('\n');
            }
        }
        out
    }

    pub fn defaults(&self) -> Result<Defaults, SubscriptionError> {
        match &self.variant {
            Variant::UserDefined { defaults } => {
                Ok(Defaults::from_bits(defaults.load(Ordering::SeqCst)))
            }
            Variant::Downloadable => Err(SubscriptionError::NotUserDefined),
        }
    }

    pub fn is_default_for(&self, filter: &Filter) -> Result<bool, SubscriptionError> {
        match &self.variant {
            Variant::UserDefined { defaults } => {
                let bits = defaults.load(Ordering::SeqCst);
                Ok(category_for(filter.kind()).is_some_and(|c| bits & c != 0))
            }
            Variant::Downloadable => Err(SubscriptionError::NotUserDefined),
        }
    }

    pub fn make_default_for(&self, filter: &Filter) -> Result<(), SubscriptionError> {
        match &self.variant {
            Variant::UserDefined { defaults } => {
                if let Some(category) = category_for(filter.kind()) {
                    defaults.fetch_or(category, Ordering::SeqCst);
                }
                Ok(())
            }
            Variant::Downloadable => Err(SubscriptionError::NotUserDefined),
        }
    }

    /// Clamps `pos` to the current filter count, inserts, and (if the
    /// subscription is listed) emits a `FILTER_ADDED` event.
    pub fn insert_filter_at(
        &self,
        filter: Arc<Filter>,
        pos: usize,
    ) -> Result<(), SubscriptionError> {
        if !self.is_user_defined() {
            return Err(SubscriptionError::NotUserDefined);
        }
        let pos = {
            let mut filters = self.filters.lock().expect("filters mutex poisoned");
            let pos = pos.min(filters.len());
            filters.insert(pos, filter.clone());
            pos
        };
        if self.listed() {
            notifier().filter_change(FilterTopic::Added, &filter, self, pos);
        }
        Ok(())
    }

    /// Removes the filter at `pos`. Returns `Ok(false)` (not an error) when
    /// `pos` is out of range, matching the reference's boolean-return
    /// contract.
    pub fn remove_filter_at(&self, pos: usize) -> Result<bool, SubscriptionError> {
        if !self.is_user_defined() {
            return Err(SubscriptionError::NotUserDefined);
        }
        let removed = {
            let mut filters = self.filters.lock().expect("filters mutex poisoned");
            if pos >= filters.len() {
                None
            } else {
                Some(filters.remove(pos))
            }
        };
        match removed {
            None => Ok(false),
            Some(filter) => {
                if self.listed() {
                    notifier().filter_change(FilterTopic::Removed, &filter, self, pos);
                }
                Ok(true)
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        registry().remove_if(&self.id, |_, weak| weak.upgrade().is_none());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(Subscription: Send, Sync);

    fn kv(k: &str, v: &str) -> KeyValue {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn missing_url_yields_none() {
        assert!(Subscription::from_properties(&[]).is_none());
        assert!(Subscription::from_properties(&[kv("url", "")]).is_none());
    }

    #[test]
    fn explicit_user_id_succeeds() {
        let sub = Subscription::from_properties(&[kv("url", "~user~explicit-test")]).unwrap();
        assert_eq!(sub.id(), "~user~explicit-test");
        assert_eq!(sub.sub_type(), SubscriptionType::UserDefined);
    }

    #[test]
    fn downloadable_id_has_downloadable_type() {
        let sub =
            Subscription::from_properties(&[kv("url", "https://example.invalid/a.txt")]).unwrap();
        assert_eq!(sub.sub_type(), SubscriptionType::Downloadable);
    }

    #[test]
    fn registry_returns_existing_instance_for_known_id() {
        let a = Subscription::from_properties(&[kv("url", "https://example.invalid/dup.txt")])
            .unwrap();
        let b = Subscription::from_properties(&[
            kv("url", "https://example.invalid/dup.txt"),
            kv("title", "ignored because id already known"),
        ])
        .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.title().as_str(), "");
    }

    #[test]
    fn title_and_disabled_setters_are_compare_then_assign() {
        let sub =
            Subscription::from_properties(&[kv("url", "https://example.invalid/notify.txt")])
                .unwrap();
        sub.set_title("Example");
        assert_eq!(sub.title().as_str(), "Example");
        sub.set_title("Example");
        sub.set_disabled(true);
        assert!(sub.disabled());
    }

    #[test]
    fn defaults_parsing_ignores_unknown_tokens() {
        let sub = Subscription::from_properties(&[
            kv("url", "~user~defaults-test"),
            kv("defaults", " blocking elemhide  bogus whitelist"),
        ])
        .unwrap();
        let defaults = sub.defaults().unwrap();
        assert!(defaults.blocking);
        assert!(defaults.whitelist);
        assert!(defaults.elemhide);
    }

    #[test]
    fn serialize_properties_emits_defaults_in_fixed_order() {
        let sub = Subscription::from_properties(&[
            kv("url", "~user~defaults-order-test"),
            kv("defaults", "elemhide blocking whitelist"),
        ])
        .unwrap();
        let serialized = sub.serialize_properties();
        assert!(serialized.ends_with("defaults= blocking whitelist elemhide\n"));
    }

    #[test]
    fn generic_subscription_suppresses_defaults_line() {
        let sub = Subscription::from_properties(&[kv("url", "~user~")]).unwrap();
        assert!(!sub.serialize_properties().contains("defaults="));
    }

    #[test]
    fn auto_generated_shaped_id_with_no_defaults_suppresses_line_too() {
        let sub = Subscription::from_properties(&[kv("url", "~user~123456")]).unwrap();
        assert!(!sub.serialize_properties().contains("defaults="));
    }

    #[test]
    fn non_generic_literal_id_with_defaults_still_emits_line() {
        let sub = Subscription::from_properties(&[
            kv("url", "~user~"),
            kv("defaults", "blocking"),
        ])
        .unwrap();
        assert!(sub.serialize_properties().contains("defaults= blocking\n"));
    }

    #[test]
    fn non_user_defined_operations_on_downloadable_error() {
        let sub =
            Subscription::from_properties(&[kv("url", "https://example.invalid/plain.txt")])
                .unwrap();
        assert_eq!(sub.defaults(), Err(SubscriptionError::NotUserDefined));
        let filter = Filter::from_text("||ads.example^");
        assert_eq!(
            sub.insert_filter_at(filter, 0),
            Err(SubscriptionError::NotUserDefined)
        );
    }

    #[test]
    fn insert_and_remove_notify_only_when_listed() {
        let sub =
            Subscription::from_properties(&[kv("url", "~user~insert-remove-test")]).unwrap();
        let filter = Filter::from_text("||notified.example^");

        sub.set_listed(false);
        sub.insert_filter_at(filter.clone(), 0).unwrap();
        assert_eq!(sub.filter_count(), 1);

        sub.set_listed(true);
        assert!(sub.remove_filter_at(0).unwrap());
        assert_eq!(sub.filter_count(), 0);
        assert!(!sub.remove_filter_at(0).unwrap());
    }

    #[test]
    fn insert_clamps_position_to_length() {
        let sub = Subscription::from_properties(&[kv("url", "~user~clamp-test")]).unwrap();
        let filter = Filter::from_text("||clamp.example^");
        sub.insert_filter_at(filter, 9999).unwrap();
        assert_eq!(sub.filter_count(), 1);
    }
}
