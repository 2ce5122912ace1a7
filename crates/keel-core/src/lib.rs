//! Core runtime for Keel: the event hub, field schemas, records, and
//! observably-mutable keyed collections, with the ergonomics exported via
//! the `prelude`.

// public exports are one module level down
pub mod collection;
pub mod error;
pub mod event;
pub mod key;
pub mod record;
pub mod schema;
pub mod value;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, schedulers, or internal helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        collection::{Collection, Direction, Filter, Grouper, Item, Sorter, ToRemove},
        event::{Control, EventHub, EventPayload, ListenerOptions},
        key::Key,
        record::{Record, SetOptions},
        schema::{Field, FieldType, Schema},
        value::Value,
    };
}
