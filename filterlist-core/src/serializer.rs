//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! Renders subscriptions back into the filter-list text format. The
//! counterpart to [`crate::parser::Parser`]: feeding [`Serializer::serialize`]
//! output for every subscription the parser produced, in order, reconstructs
//! the original file.

use crate::subscription::Subscription;

/// Escapes a literal `[` as `\[` so a filter line can never be mistaken for
/// a section header. Skips the allocation entirely when no bracket is
/// present, which is the overwhelmingly common case.
fn escape(line: &str) -> std::borrow::Cow<'_, str> {
    if line.contains('[') {
        std::borrow::Cow::Owned(line.replace('[', "\\["))
    } else {
        std::borrow::Cow::Borrowed(line)
    }
}

pub struct Serializer {
    buffer: String,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    pub fn new() -> Self {
        let mut buffer = String::new();
        buffer.push_str("# Adblock Plus preferences\nversion=5\n");
        Serializer { buffer }
    }

    /// Appends one subscription's `[Subscription]` block, and (when it has
    /// any filters) its `[Subscription filters]` block. Calling this
    /// repeatedly concatenates blocks into the same buffer, in call order.
    pub fn serialize(&mut self, subscription: &Subscription) {
        self.buffer.push_str("[Subscription]\n");
        self.buffer.push_str(&subscription.serialize_properties());

        let filters = subscription.filters();
        if !filters.is_empty() {
            self.buffer.push_str("[Subscription filters]\n");
            for filter in &filters {
                self.buffer.push_str(&escape(filter.text()));
                self.buffer.push('\n');
            }
        }
    }

    pub fn data(&self) -> &str {
        &self.buffer
    }

    pub fn into_data(self) -> String {
        self.buffer
    }
}
