use crate::collection::base::{Collection, CollectionCore};
use crate::collection::events::{AddDetails, ItemChangeDetails, KeyUpdateDetails, RemoveDetails};
use crate::collection::Item;
use std::cell::Cell;
use std::rc::Weak;

///
/// CollectionObserver
///
/// Structural notification protocol. Observers run in ascending priority
/// order, before the matching public event fires, and see the collection in
/// its post-operation state.
///

pub trait CollectionObserver<T: Item> {
    /// Ascending order; group maintenance runs at -200, ahead of generic
    /// observers.
    fn priority(&self) -> i32 {
        0
    }

    fn on_collection_add(&self, source: &Collection<T>, details: &AddDetails<T>) {
        let _ = (source, details);
    }

    fn on_collection_remove(&self, source: &Collection<T>, details: &RemoveDetails<T>) {
        let _ = (source, details);
    }

    fn on_collection_before_item_change(&self, source: &Collection<T>, details: &ItemChangeDetails<T>) {
        let _ = (source, details);
    }

    fn on_collection_item_change(&self, source: &Collection<T>, details: &ItemChangeDetails<T>) {
        let _ = (source, details);
    }

    fn on_collection_filtered_item_change(&self, source: &Collection<T>, details: &ItemChangeDetails<T>) {
        let _ = (source, details);
    }

    fn on_collection_update_key(&self, source: &Collection<T>, details: &KeyUpdateDetails<T>) {
        let _ = (source, details);
    }

    fn on_collection_refresh(&self, source: &Collection<T>) {
        let _ = source;
    }

    fn on_collection_begin_update(&self, source: &Collection<T>) {
        let _ = source;
    }

    fn on_collection_end_update(&self, source: &Collection<T>) {
        let _ = source;
    }

    fn on_collection_filter(&self, source: &Collection<T>) {
        let _ = source;
    }

    fn on_collection_filter_add(&self, source: &Collection<T>, items: &[T]) {
        let _ = (source, items);
    }
}

///
/// ChainLink
///
/// The observer a derived collection registers on its source. Holds the
/// derived end weakly so dropping the derived collection detaches the
/// chain without explicit cleanup.
///

pub(crate) struct ChainLink<T: Item> {
    target: Weak<CollectionCore<T>>,
    /// Set between `before_item_change` and `item_change`: the key move is
    /// reported through the item-change path, so the standalone update-key
    /// notification must be ignored.
    suppress_update_key: Cell<bool>,
}

impl<T: Item> ChainLink<T> {
    pub(crate) fn new(target: Weak<CollectionCore<T>>) -> Self {
        Self {
            target,
            suppress_update_key: Cell::new(false),
        }
    }

    fn target(&self) -> Option<Collection<T>> {
        self.target.upgrade().map(Collection::from_core)
    }
}

impl<T: Item> CollectionObserver<T> for ChainLink<T> {
    fn on_collection_add(&self, source: &Collection<T>, details: &AddDetails<T>) {
        if let Some(target) = self.target() {
            target.source_added(source, details);
        }
    }

    fn on_collection_remove(&self, _source: &Collection<T>, details: &RemoveDetails<T>) {
        if let Some(target) = self.target() {
            target.source_removed(details);
        }
    }

    fn on_collection_before_item_change(&self, _source: &Collection<T>, _details: &ItemChangeDetails<T>) {
        self.suppress_update_key.set(true);
    }

    fn on_collection_item_change(&self, _source: &Collection<T>, details: &ItemChangeDetails<T>) {
        self.suppress_update_key.set(false);
        if let Some(target) = self.target() {
            target.item_changed_with_key(&details.item, details.modified.clone(), details.old_key.clone());
        }
    }

    fn on_collection_filtered_item_change(&self, _source: &Collection<T>, _details: &ItemChangeDetails<T>) {
        // Invisible at the source, so invisible here. Just re-arm.
        self.suppress_update_key.set(false);
    }

    fn on_collection_update_key(&self, _source: &Collection<T>, details: &KeyUpdateDetails<T>) {
        if !self.suppress_update_key.get()
            && let Some(target) = self.target()
        {
            target.source_key_updated(details);
        }
    }

    fn on_collection_refresh(&self, _source: &Collection<T>) {
        if let Some(target) = self.target() {
            target.rebuild_from_source();
        }
    }

    fn on_collection_begin_update(&self, _source: &Collection<T>) {
        if let Some(target) = self.target() {
            target.begin_update();
        }
    }

    fn on_collection_end_update(&self, _source: &Collection<T>) {
        if let Some(target) = self.target() {
            target.end_update();
        }
    }
}
