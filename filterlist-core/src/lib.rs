//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

//! Storage-and-model core for an ad-blocking filter engine: a parser and
//! serializer for the Adblock Plus filter-list text format, the filter
//! taxonomy it produces, and the subscription model that owns filters.
//!
//! The crate has no knowledge of network fetching, pattern matching against
//! real URLs, or a scripting host; those live outside this layer and talk
//! to it through [`regexp::RegExpEngine`] and [`notifier::Notifier`].

pub mod filter;
pub mod notifier;
pub mod parser;
pub mod regexp;
pub mod serializer;
pub mod subscription;
pub mod text;

pub use filter::Filter;
pub use filter::FilterKind;
pub use parser::Parser;
pub use serializer::Serializer;
pub use subscription::Subscription;
pub use subscription::SubscriptionType;
