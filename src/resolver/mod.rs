//! Algorithms over the databases: ordering, closure and ranking.
//!
//! Everything here is pure; loading and saving happens in `db` and `ops`.

pub mod closure;
pub mod matching;
pub mod order;

pub use closure::{complete_specs, Completion};
pub use matching::{rank, RankedBuild};
pub use order::{settle_levels, CycleWarning, Settled};
