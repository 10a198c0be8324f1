//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! The filter taxonomy: classification of a filter-list line into one of
//! `{ Invalid, Comment, Blocking, Whitelist, ElemHide, ElemHideException,
//! ElemHideEmulation, CssProperty }`, and the text-keyed interning table
//! that guarantees at most one live `Filter` per canonical text.

use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;

use crate::regexp::RegExpId;
use crate::text::trim_spaces;
use crate::text::Text;

/// Tag drawn from `{ INVALID, COMMENT, BLOCKING, WHITELIST, ELEMHIDE,
/// ELEMHIDE_EXCEPTION, ELEMHIDE_EMULATION, CSS_PROPERTY }`. The bit
/// encoding keeps `ELEMHIDEBASE` (bit 2) set on every element-hiding
/// variant, reproducing the reference's mask trick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterKind {
    Invalid = 0b000,
    Comment = 0b001,
    Blocking = 0b010,
    Whitelist = 0b011,
    ElemHide = 0b100,
    ElemHideException = 0b101,
    ElemHideEmulation = 0b110,
    CssProperty = 0b111,
}

impl FilterKind {
    /// Bit shared by every element-hiding variant.
    pub const ELEMHIDEBASE: u8 = 0b100;

    pub fn is_elemhide_base(self) -> bool {
        (self as u8) & Self::ELEMHIDEBASE != 0
    }
}

/// Per-variant data beyond the shared `text`/`kind` header.
#[derive(Debug, Clone)]
pub enum FilterDetail {
    None,
    /// Carries the reason the classifier rejected the line.
    Invalid { reason: String },
    /// Blocking/whitelist filters: the `$`-separated option tokens and the
    /// handle of the pattern registered with the external regex engine.
    Request {
        options: Vec<String>,
        pattern_id: Option<RegExpId>,
    },
    /// Element-hiding variants: the comma-separated domain list and the
    /// CSS selector (or property syntax for `CssProperty`).
    ElemHide { domains: String, selector: String },
}

#[derive(Debug)]
pub struct Filter {
    text: String,
    kind: FilterKind,
    detail: FilterDetail,
}

static FILTER_REGISTRY: std::sync::OnceLock<DashMap<String, Weak<Filter>>> =
    std::sync::OnceLock::new();

fn registry() -> &'static DashMap<String, Weak<Filter>> {
    FILTER_REGISTRY.get_or_init(DashMap::new)
}

impl Filter {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn detail(&self) -> &FilterDetail {
        &self.detail
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.detail {
            FilterDetail::Invalid { reason } => Some(reason),
            _ => None,
        }
    }

    /// The sole constructor used by the parser. Normalizes `text`,
    /// classifies it, and interns the result so that two calls with equal
    /// canonical text return the same underlying filter.
    pub fn from_text(text: &str) -> Arc<Filter> {
        let trimmed = Text::borrowed(text);
        let normalized = trim_spaces(&trimmed).as_str().to_string();

        if let Some(existing) = registry().get(&normalized).and_then(|w| w.upgrade()) {
            return existing;
        }

        let (kind, detail) = classify(&normalized);
        let filter = Arc::new(Filter {
            text: normalized.clone(),
            kind,
            detail,
        });

        // Another thread may have raced us to construction; the entry API
        // keeps interning a true "first insert wins" guarantee.
        let winner = match registry().entry(normalized) {
            dashmap::mapref::entry::Entry::Occupied(mut occ) => match occ.get().upgrade() {
                Some(existing) => existing,
                None => {
                    occ.insert(Arc::downgrade(&filter));
                    filter
                }
            },
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                vac.insert(Arc::downgrade(&filter));
                filter
            }
        };
        winner
    }
}

impl Drop for Filter {
    fn drop(&mut self) {
        if let FilterDetail::Request {
            pattern_id: Some(id),
            ..
        } = &self.detail
        {
            crate::regexp::engine().delete(*id);
        }
        registry().remove_if(&self.text, |_, weak| weak.upgrade().is_none());
    }
}

fn classify(text: &str) -> (FilterKind, FilterDetail) {
    if text.is_empty() || text.starts_with('!') {
        return (FilterKind::Comment, FilterDetail::None);
    }

    if let Some((kind, sep_start, sep_len)) = find_elemhide_separator(text) {
        let domains = &text[..sep_start];
        let selector = &text[sep_start + sep_len..];
        if selector.is_empty() {
            return (
                FilterKind::Invalid,
                FilterDetail::Invalid {
                    reason: "element-hiding filter is missing a selector".to_string(),
                },
            );
        }
        return (
            kind,
            FilterDetail::ElemHide {
                domains: domains.to_string(),
                selector: selector.to_string(),
            },
        );
    }

    let (kind, rest) = if let Some(rest) = text.strip_prefix("@@") {
        (FilterKind::Whitelist, rest)
    } else {
        (FilterKind::Blocking, text)
    };

    let (pattern, options) = match rest.rfind('$') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };

    let options: Vec<String> = if options.is_empty() {
        Vec::new()
    } else {
        options.split(',').map(str::to_string).collect()
    };

    let case_sensitive = options.iter().any(|o| o == "match-case");
    let pattern_id = Some(crate::regexp::engine().generate(pattern, case_sensitive));

    (kind, FilterDetail::Request { options, pattern_id })
}

/// Finds the earliest element-hiding separator in `text`, returning its
/// kind plus byte offset and length. `#@#`, `#?#` and `#$#` never share a
/// prefix with `##`, so a single left-to-right scan over `#` occurrences
/// resolves the ambiguity without backtracking.
fn find_elemhide_separator(text: &str) -> Option<(FilterKind, usize, usize)> {
    let bytes = text.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] != b'#' {
            continue;
        }
        if text[i..].starts_with("#@#") {
            return Some((FilterKind::ElemHideException, i, 3));
        }
        if text[i..].starts_with("#?#") {
            return Some((FilterKind::ElemHideEmulation, i, 3));
        }
        if text[i..].starts_with("#$#") {
            return Some((FilterKind::CssProperty, i, 3));
        }
        if text[i..].starts_with("##") {
            return Some((FilterKind::ElemHide, i, 2));
        }
    }
    None
}
