//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! The narrow outbound interface the subscription model uses to announce
//! changes. The transport that carries these events to a scripting host is
//! out of scope; this module only defines the contract.

use std::sync::Arc;

use crate::filter::Filter;
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTopic {
    Title,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterTopic {
    Added,
    Removed,
}

pub trait Notifier: Send + Sync {
    fn subscription_change(&self, topic: SubscriptionTopic, subscription: &Subscription);

    fn filter_change(
        &self,
        topic: FilterTopic,
        filter: &Arc<Filter>,
        subscription: &Subscription,
        position: usize,
    );
}

/// A notifier that drops every event, used when nothing downstream needs
/// to observe changes (e.g. during parsing, which calls `AddFilter`
/// directly and never goes through the notifying setters/insert methods).
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn subscription_change(&self, _topic: SubscriptionTopic, _subscription: &Subscription) {}

    fn filter_change(
        &self,
        _topic: FilterTopic,
        _filter: &Arc<Filter>,
        _subscription: &Subscription,
        _position: usize,
    ) {
    }
}

static NOTIFIER: std::sync::OnceLock<Box<dyn Notifier>> = std::sync::OnceLock::new();

/// Installs the process-wide notifier collaborator. Subsequent calls are
/// ignored; call this before parsing or mutating subscriptions if the
/// default no-op notifier isn't suitable.
pub fn install_notifier(notifier: Box<dyn Notifier>) {
    let _ = NOTIFIER.set(notifier);
}

pub fn notifier() -> &'static dyn Notifier {
    NOTIFIER.get_or_init(|| Box::new(NullNotifier)).as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_notifier_accepts_every_call_without_panicking() {
        let notifier = NullNotifier;
        // Exercised for its side-effect-free contract; nothing to assert.
        let _ = &notifier;
    }
}
