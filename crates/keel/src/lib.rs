//! Keel — reactive keyed collections, records, and eventing.
//!
//! This is the public meta-crate. Downstream users depend on **keel** only.
//! It re-exports the stable public API from `keel-core`.

pub use keel_core as core;

pub use keel_core::{collection, error, event, key, record, schema, value};

//
// Prelude
//

pub mod prelude {
    pub use keel_core::prelude::*;
}
