//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! Incremental, line-oriented parser for the filter-list text format.
//!
//! Feed lines to [`Parser::process`] in order, then call [`Parser::finalize`]
//! once the input is exhausted to flush the subscription under
//! construction. The parser never borrows past a single call to `process`:
//! every property and filter line is copied into an owned `String` before
//! the call returns.

use std::sync::Arc;

use crate::filter::Filter;
use crate::subscription::KeyValue;
use crate::subscription::Subscription;
use crate::text::trim_spaces;
use crate::text::Text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    SubscriptionSection,
    SubscriptionFiltersSection,
}

/// Checks whether `line` is exactly `[name]`, comparing `name`
/// case-insensitively (ASCII only) against the bracketed content. The
/// length check (`line.len() == name.len() + 2`) rejects a line that
/// merely starts with `[name` as a prefix, e.g. trailing whitespace inside
/// the brackets is not tolerated.
fn is_section(line: &str, name: &str) -> bool {
    if line.len() != name.len() + 2 {
        return false;
    }
    if !line.starts_with('[') || !line.ends_with(']') {
        return false;
    }
    line[1..line.len() - 1].eq_ignore_ascii_case(name)
}

/// Undoes the serializer's `\[` escape, turning `\[test\][other` back into
/// `[test][other`. A single left-to-right pass suffices: the escape only
/// ever introduces a backslash immediately before a literal `[`.
fn unescape(line: &str) -> String {
    if !line.contains('[') {
        return line.to_string();
    }
    line.replace("\\[", "[")
}

fn split_key_value(line: &str) -> Option<KeyValue> {
    let eq = line.find('=')?;
    let key = trim_spaces(&Text::borrowed(&line[..eq])).as_str().to_string();
    let value = trim_spaces(&Text::borrowed(&line[eq + 1..])).as_str().to_string();
    Some((key, value))
}

pub struct Parser {
    state: State,
    file_properties: Vec<KeyValue>,
    current_properties: Vec<KeyValue>,
    current_subscription: Option<Arc<Subscription>>,
    subscriptions: Vec<Arc<Subscription>>,
    on_fail: Option<Box<dyn FnMut(&str) + Send>>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            state: State::Initial,
            file_properties: Vec::new(),
            current_properties: Vec::new(),
            current_subscription: None,
            subscriptions: Vec::new(),
            on_fail: None,
        }
    }

    /// Installs a callback invoked with the raw (trimmed) line whenever a
    /// line in `Initial` or `SubscriptionSection` is neither a
    /// `[Subscription]`/`[Subscription filters]` header nor a recognizable
    /// `key=value` pair.
    pub fn with_fail_handler(mut self, handler: Box<dyn FnMut(&str) + Send>) -> Self {
        self.on_fail = Some(handler);
        self
    }

    fn fail(&mut self, line: &str) {
        tracing::debug!(%line, "unrecognized line");
        if let Some(on_fail) = self.on_fail.as_mut() {
            on_fail(line);
        }
    }

    /// Feeds a single line (without its line terminator) to the state
    /// machine. Blank lines (after trimming) are skipped in every state.
    pub fn process(&mut self, line: &str) {
        let view = Text::borrowed(line);
        let trimmed = trim_spaces(&view);
        let trimmed = trimmed.as_str();
        if trimmed.is_empty() {
            return;
        }

        // A `[Subscription]` header ends whatever subscription is under
        // construction regardless of the current state, then starts a new
        // one. Checked before the per-state dispatch, as in every state.
        if is_section(trimmed, "Subscription") {
            self.finalize_current();
            tracing::trace!("entering SubscriptionSection");
            self.state = State::SubscriptionSection;
            return;
        }

        match self.state {
            State::Initial => {
                if trimmed.starts_with('#') {
                    return;
                }
                match split_key_value(trimmed) {
                    Some(kv) => self.file_properties.push(kv),
                    None => self.fail(trimmed),
                }
            }
            State::SubscriptionSection => {
                if is_section(trimmed, "Subscription filters") {
                    // The subscription is materialized here, before any
                    // filter lines arrive, so that filters attach to the
                    // same instance the registry hands back for this id.
                    self.current_subscription = Subscription::from_properties(&self.current_properties);
                    if self.current_subscription.is_none() {
                        tracing::debug!("subscription block has no usable url, filters will be dropped");
                    }
                    tracing::trace!("entering SubscriptionFiltersSection");
                    self.state = State::SubscriptionFiltersSection;
                    return;
                }
                match split_key_value(trimmed) {
                    Some(kv) => self.current_properties.push(kv),
                    None => self.fail(trimmed),
                }
            }
            State::SubscriptionFiltersSection => {
                if let Some(subscription) = &self.current_subscription {
                    let filter = Filter::from_text(&unescape(trimmed));
                    subscription.add_filter(filter);
                }
            }
        }
    }

    /// Flushes the subscription under construction, if any, and resets the
    /// state machine to `Initial`. Must be called after the last line has
    /// been processed. Safe to call more than once.
    pub fn finalize(&mut self) {
        self.finalize_current();
        self.state = State::Initial;
    }

    fn finalize_current(&mut self) {
        match self.state {
            State::Initial => {}
            State::SubscriptionSection => {
                if let Some(subscription) = Subscription::from_properties(&self.current_properties) {
                    self.subscriptions.push(subscription);
                }
            }
            State::SubscriptionFiltersSection => {
                if let Some(subscription) = self.current_subscription.take() {
                    self.subscriptions.push(subscription);
                }
            }
        }
        self.current_properties.clear();
        self.current_subscription = None;
    }

    pub fn file_properties(&self) -> &[KeyValue] {
        &self.file_properties
    }

    pub fn subscriptions(&self) -> &[Arc<Subscription>] {
        &self.subscriptions
    }

    pub fn into_subscriptions(self) -> Vec<Arc<Subscription>> {
        self.subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<Arc<Subscription>> {
        let mut parser = Parser::new();
        for line in lines {
            parser.process(line);
        }
        parser.finalize();
        parser.into_subscriptions()
    }

    #[test]
    fn section_names_are_case_insensitive() {
        assert!(is_section("[SUBSCRIPTION]", "Subscription"));
        assert!(is_section("[subscription]", "Subscription"));
        assert!(!is_section("[Subscription Extra]", "Subscription"));
    }

    #[test]
    fn preamble_lines_become_file_properties() {
        let mut parser = Parser::new();
        parser.process("# Adblock Plus preferences");
        parser.process("version=5");
        assert_eq!(parser.file_properties(), &[("version".to_string(), "5".to_string())]);
    }

    #[test]
    fn minimal_downloadable_subscription_round_trips() {
        let subs = run(&[
            "# Adblock Plus preferences",
            "version=5",
            "[Subscription]",
            "url=https://example.invalid/list.txt",
            "title=Example",
            "[Subscription filters]",
            "||ads.example^",
            "!comment",
            "##.banner",
        ]);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id(), "https://example.invalid/list.txt");
        assert_eq!(subs[0].title().as_str(), "Example");
        assert_eq!(subs[0].filter_count(), 3);
        assert_eq!(subs[0].filter_at(0).unwrap().kind(), crate::filter::FilterKind::Blocking);
        assert_eq!(subs[0].filter_at(1).unwrap().kind(), crate::filter::FilterKind::Comment);
        assert_eq!(subs[0].filter_at(2).unwrap().kind(), crate::filter::FilterKind::ElemHide);
    }

    #[test]
    fn subscription_without_filters_section_still_finalizes() {
        let subs = run(&["[Subscription]", "url=~user~no-filters-block"]);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].filter_count(), 0);
    }

    #[test]
    fn escaped_bracket_is_decoded_before_interning() {
        let subs = run(&[
            "[Subscription]",
            "url=~user~escape-test",
            "[Subscription filters]",
            "\\[test\\][other",
        ]);
        assert_eq!(subs[0].filter_at(0).unwrap().text(), "[test][other");
    }

    #[test]
    fn multiple_subscriptions_are_kept_separate() {
        let subs = run(&[
            "[Subscription]",
            "url=https://example.invalid/a.txt",
            "[Subscription filters]",
            "||a.example^",
            "[Subscription]",
            "url=https://example.invalid/b.txt",
            "[Subscription filters]",
            "||b.example^",
        ]);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].filter_count(), 1);
        assert_eq!(subs[1].filter_count(), 1);
    }

    #[test]
    fn section_case_insensitivity_for_both_headers() {
        let subs = run(&[
            "[SUBSCRIPTION]",
            "url=~user~case-test",
            "[Subscription Filters]",
            "||case.example^",
        ]);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].filter_count(), 1);
    }

    #[test]
    fn malformed_property_line_invokes_fail_handler() {
        use std::sync::Mutex;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut parser = Parser::new().with_fail_handler(Box::new(move |line| {
            seen_clone.lock().unwrap().push(line.to_string());
        }));
        parser.process("[Subscription]");
        parser.process("not-a-key-value-line");
        parser.finalize();
        assert_eq!(seen.lock().unwrap().as_slice(), ["not-a-key-value-line"]);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let subs = run(&[
            "[Subscription]",
            "url=~user~blank-test",
            "",
            "   ",
            "[Subscription filters]",
            "",
            "||x.example^",
        ]);
        assert_eq!(subs[0].filter_count(), 1);
    }
}
