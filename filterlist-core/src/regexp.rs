//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! The outbound regex interface: request filters register a compiled
//! pattern with an external matching engine at construction and release it
//! at destruction. Evaluating filters against network requests is out of
//! scope for this crate (see spec Non-goals); this module only models the
//! registration/deregistration contract the filter taxonomy depends on.

use std::sync::OnceLock;

pub type RegExpId = u64;

/// The external regex engine collaborator.
pub trait RegExpEngine: Send + Sync {
    /// Registers `pattern` and returns a handle for later `test`/`delete`
    /// calls.
    fn generate(&self, pattern: &str, case_sensitive: bool) -> RegExpId;

    /// Tests `text` against the pattern behind `id`. Returns `false` for an
    /// id that has been deleted.
    fn test(&self, id: RegExpId, text: &str) -> bool;

    /// Releases the pattern behind `id`.
    fn delete(&self, id: RegExpId);
}

/// A no-op engine used when the host hasn't wired up a real matcher.
/// `generate` hands out ever-increasing ids but never actually compiles
/// anything, and `test` always reports "no match" as the contract requires
/// for a deleted (here: never-materialized) pattern.
#[derive(Debug, Default)]
pub struct NoOpRegExpEngine;

impl RegExpEngine for NoOpRegExpEngine {
    fn generate(&self, _pattern: &str, _case_sensitive: bool) -> RegExpId {
        0
    }

    fn test(&self, _id: RegExpId, _text: &str) -> bool {
        false
    }

    fn delete(&self, _id: RegExpId) {}
}

static ENGINE: OnceLock<Box<dyn RegExpEngine>> = OnceLock::new();

/// Installs the process-wide regex engine collaborator. Must be called
/// before any filter is parsed if the default no-op engine is unsuitable;
/// subsequent calls are ignored, matching the once-only nature of the
/// other process-wide singletons in this crate.
pub fn install_engine(engine: Box<dyn RegExpEngine>) {
    let _ = ENGINE.set(engine);
}

pub fn engine() -> &'static dyn RegExpEngine {
    ENGINE.get_or_init(|| Box::new(NoOpRegExpEngine)).as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_engine_never_matches_and_ignores_delete() {
        let engine = NoOpRegExpEngine;
        let id = engine.generate("[0-9]*", false);
        assert!(!engine.test(id, "1234"));
        engine.delete(id);
        assert!(!engine.test(id, "1234"));
    }
}
