//! Taxonomy checkouts on the volume: naming and traversal guard, per-taxonomy locks,
//! and the clone / init / reload / upgrade lifecycle.

mod lifecycle;
mod locks;
mod runsh;
mod volume;

pub use lifecycle::{AddOutcome, Lifecycle};
pub use locks::TaxonomyLocks;
pub use runsh::{patch_run_sh, pin_tool_version};
pub use volume::{clone_url, guard, repo_name, TaxonomyRef, TaxonomyVolume};
