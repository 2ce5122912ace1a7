mod base;
mod events;
mod filter;
mod group;
mod observer;
mod sorter;

pub use base::{Collection, ToRemove};
pub use events::{AddDetails, CollectionEvent, ItemChangeDetails, KeyUpdateDetails, RemoveDetails};
pub use filter::{Filter, FilterSet};
pub use group::{Grouper, Groups};
pub use observer::CollectionObserver;
pub use sorter::{Direction, Sorter, SorterSet};

use crate::key::Key;

///
/// Item
///
/// Anything an ordered keyed collection can hold. The key must be stable
/// while the item sits in a collection; key changes go through
/// `Collection::update_key` or `item_changed`.
///

pub trait Item: Clone + 'static {
    fn item_key(&self) -> Key;

    /// Identity test used by key-update guards. Shared-handle items should
    /// override this with pointer identity.
    fn same(&self, other: &Self) -> bool {
        self.item_key() == other.item_key()
    }
}

impl Item for crate::record::Record {
    fn item_key(&self) -> Key {
        self.id()
    }

    fn same(&self, other: &Self) -> bool {
        Self::same(self, other)
    }
}
