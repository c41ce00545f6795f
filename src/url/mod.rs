//! URL canonicalization
//!
//! Item links extracted from listing fragments are frequently relative and
//! occasionally junk (`javascript:`, fragment-only anchors). This module
//! turns them into the canonical absolute detail URLs that serve as dedup
//! keys throughout the pipeline.

mod normalize;

pub use normalize::canonicalize_link;
