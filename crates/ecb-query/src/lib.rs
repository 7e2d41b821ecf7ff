//! Component filters for archetype search.
//!
//! A [`ComponentFilter`] is a boolean predicate over the component names of
//! an archetype. The command buffer and the finalized reader both evaluate
//! filters against their archetype tables to answer searches.
//!
//! # Example
//!
//! ```ignore
//! use ecb_query::ComponentFilter;
//!
//! // Living players that are not frozen.
//! let filter = ComponentFilter::contains(["player", "health"])
//!     .and(!ComponentFilter::contains(["frozen"]));
//!
//! assert!(filter.matches(&["health", "player"]));
//! assert!(!filter.matches(&["health", "player", "frozen"]));
//! ```

mod filter;

pub use filter::{ComponentFilter, ComponentTuple, Names};
