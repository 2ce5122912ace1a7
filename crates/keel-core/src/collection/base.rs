use crate::collection::events::{
    AddDetails, CollectionEvent, ItemChangeDetails, KeyUpdateDetails, RemoveDetails,
};
use crate::collection::filter::{Filter, FilterSet};
use crate::collection::group::{GroupObserver, Grouper, Groups};
use crate::collection::observer::{ChainLink, CollectionObserver};
use crate::collection::sorter::{Sorter, SorterSet};
use crate::collection::Item;
use crate::event::EventHub;
use crate::key::Key;
use crate::value::Value;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

///
/// ToRemove
///
/// What a splice removes: a count starting at the splice index, explicit
/// items, or explicit keys. Items and keys not present are ignored.
///

pub enum ToRemove<T: Item> {
    Nothing,
    Count(usize),
    Items(Vec<T>),
    Keys(Vec<Key>),
}

struct CollectionState<T: Item> {
    items: Vec<T>,
    map: HashMap<Key, T>,
    /// Lazy key -> index cache, dropped on any structural change.
    indices: Option<HashMap<Key, usize>>,
    index_rebuilds: u64,
    generation: u64,
    filters: FilterSet<T>,
    sorters: SorterSet<T>,
    grouper: Option<Grouper<T>>,
    groups: Option<Groups<T>>,
    group_observer: Option<Rc<dyn CollectionObserver<T>>>,
    source: Option<Collection<T>>,
    auto_source: bool,
    source_link: Option<Rc<ChainLink<T>>>,
    observers: Vec<Rc<dyn CollectionObserver<T>>>,
    updating: u32,
    /// Insertion hint left by `insert` before a redirect to the source, so
    /// the reflected add lands where the caller asked.
    requested_index: Option<usize>,
}

impl<T: Item> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            map: HashMap::new(),
            indices: None,
            index_rebuilds: 0,
            generation: 0,
            filters: FilterSet::default(),
            sorters: SorterSet::default(),
            grouper: None,
            groups: None,
            group_observer: None,
            source: None,
            auto_source: false,
            source_link: None,
            observers: Vec::new(),
            updating: 0,
            requested_index: None,
        }
    }
}

impl<T: Item> CollectionState<T> {
    fn sorted(&self) -> bool {
        self.grouper.is_some() || !self.sorters.is_empty()
    }

    fn compare(&self, a: &T, b: &T) -> Ordering {
        if let Some(grouper) = &self.grouper {
            let ordering = grouper.compare(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.sorters.compare(a, b)
    }

    fn ensure_indices(&mut self) {
        if self.indices.is_none() {
            self.indices = Some(
                self.items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| (item.item_key(), index))
                    .collect(),
            );
            self.index_rebuilds += 1;
        }
    }

    fn locate(&mut self, key: &Key) -> Option<usize> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.ensure_indices();
        self.indices.as_ref().and_then(|indices| indices.get(key).copied())
    }
}

pub(crate) struct CollectionCore<T: Item> {
    state: RefCell<CollectionState<T>>,
    hub: Rc<EventHub<CollectionEvent<T>>>,
}

///
/// Collection
///
/// Observably-mutable ordered keyed collection. Cheap to clone (shared
/// handle). Every mutation plans under a borrow, applies, releases the
/// borrow, then notifies observers and fires public events, so observers
/// may freely read or mutate the collection re-entrantly.
///

pub struct Collection<T: Item> {
    core: Rc<CollectionCore<T>>,
}

impl<T: Item> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: Item> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Collection<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Rc::new(CollectionCore {
                state: RefCell::new(CollectionState::default()),
                hub: EventHub::new(),
            }),
        }
    }

    #[must_use]
    pub fn from_items(items: Vec<T>) -> Self {
        let collection = Self::new();
        collection.splice(0, ToRemove::Nothing, items);
        collection
    }

    pub(crate) fn from_core(core: Rc<CollectionCore<T>>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<CollectionCore<T>> {
        Rc::downgrade(&self.core)
    }

    /// Two handles to the same collection.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// The hub carrying this collection's public events.
    #[must_use]
    pub fn events(&self) -> Rc<EventHub<CollectionEvent<T>>> {
        Rc::clone(&self.core.hub)
    }

    // ------------------------------------------------------------------
    // lookup

    #[must_use]
    pub fn len(&self) -> usize {
        self.core.state.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.state.borrow().items.is_empty()
    }

    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<T> {
        self.core.state.borrow().items.get(index).cloned()
    }

    #[must_use]
    pub fn first(&self) -> Option<T> {
        self.core.state.borrow().items.first().cloned()
    }

    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.core.state.borrow().items.last().cloned()
    }

    #[must_use]
    pub fn get_by_key(&self, key: &Key) -> Option<T> {
        self.core.state.borrow().map.get(key).cloned()
    }

    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        self.core.state.borrow().map.contains_key(key)
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.contains_key(&item.item_key())
    }

    #[must_use]
    pub fn index_of_key(&self, key: &Key) -> Option<usize> {
        self.core.state.borrow_mut().locate(key)
    }

    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.index_of_key(&item.item_key())
    }

    /// Snapshot of the current items.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.core.state.borrow().items.clone()
    }

    /// Snapshot iterator; safe to mutate the collection while iterating.
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.items().into_iter()
    }

    /// Keys in item order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.core.state.borrow().items.iter().map(Item::item_key).collect()
    }

    /// Bumped on every content change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.core.state.borrow().generation
    }

    /// Times the lazy index cache has been rebuilt (diagnostic).
    #[must_use]
    pub fn index_rebuilds(&self) -> u64 {
        self.core.state.borrow().index_rebuilds
    }

    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.core.state.borrow().sorted()
    }

    #[must_use]
    pub fn is_filtered(&self) -> bool {
        !self.core.state.borrow().filters.is_empty()
    }

    #[must_use]
    pub fn is_grouped(&self) -> bool {
        self.core.state.borrow().grouper.is_some()
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.core.state.borrow().updating > 0
    }

    #[must_use]
    pub fn source(&self) -> Option<Self> {
        self.core.state.borrow().source.clone()
    }

    /// True when the item fails this collection's filters.
    #[must_use]
    pub fn is_item_filtered(&self, item: &T) -> bool {
        !self.core.state.borrow().filters.matches(item)
    }

    // ------------------------------------------------------------------
    // observers

    pub fn add_observer(&self, observer: Rc<dyn CollectionObserver<T>>) {
        let mut state = self.core.state.borrow_mut();
        let at = state
            .observers
            .partition_point(|existing| existing.priority() <= observer.priority());
        state.observers.insert(at, observer);
    }

    pub fn remove_observer(&self, observer: &Rc<dyn CollectionObserver<T>>) {
        self.core
            .state
            .borrow_mut()
            .observers
            .retain(|existing| !Rc::ptr_eq(existing, observer));
    }

    fn notify(&self, call: impl Fn(&dyn CollectionObserver<T>)) {
        let snapshot: Vec<Rc<dyn CollectionObserver<T>>> =
            self.core.state.borrow().observers.clone();
        for observer in snapshot {
            call(observer.as_ref());
        }
    }

    // ------------------------------------------------------------------
    // update bracketing

    pub fn begin_update(&self) {
        let outermost = {
            let mut state = self.core.state.borrow_mut();
            state.updating += 1;
            state.updating == 1
        };
        if outermost {
            self.notify(|observer| observer.on_collection_begin_update(self));
            self.core.hub.fire(CollectionEvent::BeginUpdate);
        }
    }

    pub fn end_update(&self) {
        let outermost = {
            let mut state = self.core.state.borrow_mut();
            if state.updating == 0 {
                return;
            }
            state.updating -= 1;
            state.updating == 0
        };
        if outermost {
            self.notify(|observer| observer.on_collection_end_update(self));
            self.core.hub.fire(CollectionEvent::EndUpdate);
        }
    }

    /// Run a batch of mutations inside one update bracket.
    pub fn update(&self, batch: impl FnOnce(&Self)) {
        self.begin_update();
        batch(self);
        self.end_update();
    }

    /// Raise the updating count without the begin/end notifications. Used
    /// around item-change reflection so re-entrant calls stay local.
    fn lock_updates(&self) {
        self.core.state.borrow_mut().updating += 1;
    }

    fn unlock_updates(&self) {
        let mut state = self.core.state.borrow_mut();
        if state.updating > 0 {
            state.updating -= 1;
        }
    }

    fn set_requested_index(&self, index: Option<usize>) {
        self.core.state.borrow_mut().requested_index = index;
    }

    fn take_requested_index(&self) -> Option<usize> {
        self.core.state.borrow_mut().requested_index.take()
    }

    /// The source to redirect direct mutations to, when this collection is
    /// derived and not currently reacting to that source.
    fn redirect(&self) -> Option<Self> {
        let state = self.core.state.borrow();
        if state.updating == 0 {
            state.source.clone()
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // mutation surface

    pub fn add(&self, items: Vec<T>) {
        let len = self.len();
        self.splice(isize::try_from(len).unwrap_or(isize::MAX), ToRemove::Nothing, items);
    }

    pub fn insert(&self, index: usize, items: Vec<T>) {
        self.splice(isize::try_from(index).unwrap_or(isize::MAX), ToRemove::Nothing, items);
    }

    pub fn remove(&self, items: Vec<T>) {
        self.splice(0, ToRemove::Items(items), Vec::new());
    }

    pub fn remove_by_key(&self, key: &Key) {
        self.remove_by_keys(vec![key.clone()]);
    }

    pub fn remove_by_keys(&self, keys: Vec<Key>) {
        self.splice(0, ToRemove::Keys(keys), Vec::new());
    }

    pub fn remove_at(&self, index: usize) -> Option<T> {
        let item = self.get_at(index)?;
        self.splice(isize::try_from(index).unwrap_or(0), ToRemove::Count(1), Vec::new());
        Some(item)
    }

    /// Remove everything visible at this level.
    pub fn remove_all(&self) {
        let len = self.len();
        self.splice(0, ToRemove::Count(len), Vec::new());
    }

    /// Wipe the collection in one step, reported as a single refresh rather
    /// than per-chunk removals.
    pub fn clear(&self) {
        if let Some(source) = self.redirect() {
            source.clear();
            return;
        }
        {
            let mut state = self.core.state.borrow_mut();
            if state.items.is_empty() {
                return;
            }
            state.items.clear();
            state.map.clear();
            state.indices = None;
            state.generation += 1;
        }
        self.notify(|observer| observer.on_collection_refresh(self));
        self.core.hub.fire(CollectionEvent::Refresh);
    }

    /// Insert or replace by the item's key.
    pub fn replace(&self, item: T) {
        match self.index_of_key(&item.item_key()) {
            Some(index) => self.splice(isize::try_from(index).unwrap_or(0), ToRemove::Nothing, vec![item]),
            None => self.add(vec![item]),
        }
    }

    /// The general mutation: remove, then add, as one bracketed operation.
    ///
    /// Negative indices count from the end. Duplicate keys among the adds
    /// keep the last occurrence. An add whose key is already resident folds
    /// the resident into the removals (replace semantics). Removals are
    /// applied as contiguous chunks back to front, each reported
    /// separately; adds merge into sort position when the collection is
    /// sorted, otherwise they land at the (removal-adjusted) index.
    pub fn splice(&self, index: isize, to_remove: ToRemove<T>, to_add: Vec<T>) {
        // Only the root of a chain holds real membership; a derived splice
        // translates its coordinates and runs against the source.
        if let Some(source) = self.redirect() {
            self.splice_to_source(&source, index, to_remove, to_add);
            return;
        }

        self.begin_update();
        let (removes, adds) = {
            let mut state = self.core.state.borrow_mut();
            Self::apply_splice(&mut state, index, to_remove, to_add)
        };
        for details in &removes {
            self.notify(|observer| observer.on_collection_remove(self, details));
            self.core.hub.fire(CollectionEvent::Remove(details.clone()));
        }
        for details in &adds {
            self.notify(|observer| observer.on_collection_add(self, details));
            self.core.hub.fire(CollectionEvent::Add(details.clone()));
        }
        self.end_update();
    }

    /// Rerun a derived splice in source coordinates. Removals translate to
    /// the keys of the local residents; the insertion point becomes the
    /// source position of the resident at the local index (append when the
    /// index is past the visible tail). The local index is left as the
    /// reflection hint so the mirrored add lands where the caller asked.
    fn splice_to_source(&self, source: &Self, index: isize, to_remove: ToRemove<T>, to_add: Vec<T>) {
        let len = self.len();
        let at = if index < 0 {
            len.saturating_sub(index.unsigned_abs())
        } else {
            index.unsigned_abs().min(len)
        };

        let to_remove = match to_remove {
            ToRemove::Count(count) => {
                let state = self.core.state.borrow();
                ToRemove::Keys(
                    state.items[at..at.saturating_add(count).min(len)]
                        .iter()
                        .map(Item::item_key)
                        .collect(),
                )
            }
            other => other,
        };

        let source_at = self
            .get_at(at)
            .and_then(|resident| source.index_of(&resident))
            .unwrap_or_else(|| source.len());

        self.set_requested_index(Some(at));
        source.splice(
            isize::try_from(source_at).unwrap_or(isize::MAX),
            to_remove,
            to_add,
        );
        self.set_requested_index(None);
    }

    #[allow(clippy::too_many_lines)]
    fn apply_splice(
        state: &mut CollectionState<T>,
        index: isize,
        to_remove: ToRemove<T>,
        to_add: Vec<T>,
    ) -> (Vec<RemoveDetails<T>>, Vec<AddDetails<T>>) {
        let len = state.items.len();
        let mut at = if index < 0 {
            len.saturating_sub(index.unsigned_abs())
        } else {
            (index.unsigned_abs()).min(len)
        };

        // Last occurrence wins among duplicate add keys.
        let mut seen = HashSet::new();
        let mut adds: Vec<T> = to_add
            .into_iter()
            .rev()
            .filter(|item| seen.insert(item.item_key()))
            .collect();
        adds.reverse();

        let mut remove_indices: Vec<usize> = match to_remove {
            ToRemove::Nothing => Vec::new(),
            ToRemove::Count(count) => (at..at.saturating_add(count).min(len)).collect(),
            ToRemove::Items(items) => items
                .iter()
                .filter_map(|item| state.locate(&item.item_key()))
                .collect(),
            ToRemove::Keys(keys) => keys.iter().filter_map(|key| state.locate(key)).collect(),
        };

        // Replace semantics: adds colliding with resident keys remove the
        // resident first.
        for item in &adds {
            if let Some(resident) = state.locate(&item.item_key()) {
                remove_indices.push(resident);
            }
        }
        remove_indices.sort_unstable();
        remove_indices.dedup();

        let mut removes: Vec<RemoveDetails<T>> = Vec::new();
        let chunks = coalesce(&remove_indices);
        for &(start, count) in chunks.iter().rev() {
            let removed: Vec<T> = state.items.drain(start..start + count).collect();
            let keys: Vec<Key> = removed.iter().map(Item::item_key).collect();
            for key in &keys {
                state.map.remove(key);
            }
            removes.push(RemoveDetails {
                at: start,
                items: removed,
                keys,
            });
        }
        if !remove_indices.is_empty() {
            state.indices = None;
            let removed_before = remove_indices.iter().take_while(|&&i| i < at).count();
            at -= removed_before;
        }

        let mut add_details: Vec<AddDetails<T>> = Vec::new();
        if !adds.is_empty() {
            if state.sorted() {
                adds.sort_by(|a, b| state.compare(a, b));
                for item in &adds {
                    state.map.insert(item.item_key(), item.clone());
                }
                if state.items.is_empty() {
                    let keys = adds.iter().map(Item::item_key).collect();
                    state.items.clone_from(&adds);
                    add_details.push(AddDetails {
                        at: 0,
                        items: adds,
                        keys,
                    });
                } else {
                    add_details = Self::splice_merge(state, adds);
                }
            } else {
                for item in &adds {
                    state.map.insert(item.item_key(), item.clone());
                }
                let keys = adds.iter().map(Item::item_key).collect();
                state.items.splice(at..at, adds.iter().cloned());
                add_details.push(AddDetails {
                    at,
                    items: adds,
                    keys,
                });
            }
            state.indices = None;
        }

        if !removes.is_empty() || !add_details.is_empty() {
            state.generation += 1;
        }
        (removes, add_details)
    }

    /// Linear merge of a sorted batch into the sorted items. One add run is
    /// reported per contiguous landing spot, with indices in post-merge
    /// coordinates.
    fn splice_merge(state: &mut CollectionState<T>, adds: Vec<T>) -> Vec<AddDetails<T>> {
        let old = std::mem::take(&mut state.items);
        let mut result: Vec<T> = Vec::with_capacity(old.len() + adds.len());
        let mut details: Vec<AddDetails<T>> = Vec::new();
        let mut old_iter = old.into_iter().peekable();
        let mut run: Vec<T> = Vec::new();
        let mut run_start = 0usize;

        for add in adds {
            // Existing items sorting at or before the incoming item stay in
            // front of it, which keeps the merge stable.
            while let Some(existing) =
                old_iter.next_if(|existing| state.compare(existing, &add) != Ordering::Greater)
            {
                if !run.is_empty() {
                    details.push(AddDetails {
                        at: run_start,
                        keys: run.iter().map(Item::item_key).collect(),
                        items: std::mem::take(&mut run),
                    });
                }
                result.push(existing);
            }
            if run.is_empty() {
                run_start = result.len();
            }
            run.push(add.clone());
            result.push(add);
        }
        if !run.is_empty() {
            details.push(AddDetails {
                at: run_start,
                keys: run.iter().map(Item::item_key).collect(),
                items: run,
            });
        }
        result.extend(old_iter);

        state.items = result;
        state.indices = None;
        details
    }

    // ------------------------------------------------------------------
    // item change

    /// An item mutated in place. Reports the change, repositions the item
    /// if sorting demands it, and re-evaluates filter visibility.
    pub fn item_changed(&self, item: &T, modified: Vec<String>) {
        self.item_changed_with_key(item, modified, None);
    }

    /// As [`item_changed`](Self::item_changed), for mutations that changed
    /// the item's key; `old_key` is the key the collection still knows.
    pub fn item_changed_with_key(&self, item: &T, modified: Vec<String>, old_key: Option<Key>) {
        // The root of a chain processes the change; everyone else reacts to
        // its notifications.
        if let Some(source) = self.source()
            && !source.is_updating()
        {
            source.item_changed_with_key(item, modified, old_key);
            return;
        }

        let key = item.item_key();
        let lookup = old_key.clone().unwrap_or_else(|| key.clone());
        let key_changed = old_key.as_ref().is_some_and(|old| *old != key);

        let (was_filtered, filtered, sorted, old_index, new_index, movement) = {
            let mut state = self.core.state.borrow_mut();
            let present = state.map.contains_key(&lookup);
            let filtered = !state.filters.matches(item);
            let sorted = state.sorted();
            let old_index = if present { state.locate(&lookup) } else { None };
            let (new_index, movement) = match old_index {
                Some(from) if sorted && !filtered => Self::plan_move(&state, item, from),
                _ => (None, 0),
            };
            (!present, filtered, sorted, old_index, new_index, movement)
        };

        let filter_changed = was_filtered != filtered;
        let mut details = ItemChangeDetails {
            item: item.clone(),
            key: key.clone(),
            old_key,
            modified,
            filter_changed,
            key_changed,
            index_changed: movement != 0,
            filtered,
            was_filtered,
            old_index,
            new_index,
        };

        self.notify(|observer| observer.on_collection_before_item_change(self, &details));
        self.core.hub.fire(CollectionEvent::BeforeItemChange(details.clone()));

        self.lock_updates();

        if key_changed && !was_filtered {
            self.update_key(item, &lookup);
        }

        if filter_changed || movement != 0 {
            if filtered {
                self.splice(0, ToRemove::Keys(vec![key.clone()]), Vec::new());
            } else if was_filtered {
                let at = self.unfilter_position(&key, sorted);
                self.splice(at, ToRemove::Nothing, vec![item.clone()]);
            } else if let Some(to) = new_index {
                self.splice(
                    isize::try_from(to).unwrap_or(0),
                    ToRemove::Keys(vec![key.clone()]),
                    vec![item.clone()],
                );
            }
        }

        // The remove-then-insert shift: report the indices the caller will
        // actually observe.
        if movement > 0 {
            details.new_index = new_index.map(|i| i.saturating_sub(1));
        } else if movement < 0 {
            details.old_index = old_index.map(|i| i + 1);
        }

        if filtered {
            self.notify(|observer| observer.on_collection_filtered_item_change(self, &details));
            self.core.hub.fire(CollectionEvent::FilteredItemChange(details));
        } else {
            self.notify(|observer| observer.on_collection_item_change(self, &details));
            self.core.hub.fire(CollectionEvent::ItemChange(details));
        }

        self.unlock_updates();
    }

    /// Where a newly-unfiltered item goes: sorted collections position by
    /// merge, unsorted ones mirror the source's neighborhood.
    fn unfilter_position(&self, key: &Key, sorted: bool) -> isize {
        if sorted {
            return 0;
        }
        let Some(source) = self.source() else {
            return isize::try_from(self.len()).unwrap_or(isize::MAX);
        };
        let at = source
            .index_of_key(key)
            .map_or_else(|| self.len(), |i| self.find_insert_index(&source, i));
        isize::try_from(at).unwrap_or(isize::MAX)
    }

    /// At most one reposition per change: if both neighbors still bracket
    /// the item, it stays; otherwise a bounded binary search on the side it
    /// escaped toward finds the new slot.
    fn plan_move(state: &CollectionState<T>, item: &T, from: usize) -> (Option<usize>, i8) {
        let items = &state.items;
        let fits_left =
            from == 0 || state.compare(&items[from - 1], item) != Ordering::Greater;
        let fits_right = from + 1 >= items.len()
            || state.compare(item, &items[from + 1]) != Ordering::Greater;

        if fits_left && fits_right {
            (None, 0)
        } else if fits_left {
            let offset = from + 1;
            let to = offset
                + items[offset..]
                    .partition_point(|existing| state.compare(existing, item) != Ordering::Greater);
            (Some(to), 1)
        } else {
            let to = items[..from]
                .partition_point(|existing| state.compare(existing, item) != Ordering::Greater);
            (Some(to), -1)
        }
    }

    /// Re-map an item whose key changed while it sits in the collection.
    ///
    /// The rename proceeds only when `old_key` still maps to this very item
    /// and the new key is free; in debug builds a violated guard panics.
    pub fn update_key(&self, item: &T, old_key: &Key) {
        let new_key = item.item_key();
        if new_key == *old_key {
            return;
        }

        let renamed = {
            let mut state = self.core.state.borrow_mut();
            match state.map.remove(old_key) {
                Some(resident) if resident.same(item) && !state.map.contains_key(&new_key) => {
                    state.map.insert(new_key.clone(), item.clone());
                    let index = state
                        .indices
                        .as_ref()
                        .and_then(|indices| indices.get(old_key).copied())
                        .or_else(|| {
                            state
                                .items
                                .iter()
                                .position(|existing| existing.item_key() == *old_key || existing.same(item))
                        });
                    if let Some(index) = index {
                        state.items[index] = item.clone();
                        if let Some(indices) = &mut state.indices {
                            indices.remove(old_key);
                            indices.insert(new_key.clone(), index);
                        }
                    }
                    state.generation += 1;
                    true
                }
                Some(resident) => {
                    let duplicate = state.map.contains_key(&new_key);
                    state.map.insert(old_key.clone(), resident);
                    #[cfg(debug_assertions)]
                    {
                        if duplicate {
                            panic!("update_key: key '{new_key}' is already in use");
                        }
                        panic!("update_key: '{old_key}' does not map to the given item");
                    }
                    #[cfg(not(debug_assertions))]
                    {
                        let _ = duplicate;
                        false
                    }
                }
                None => false,
            }
        };

        if renamed {
            let details = KeyUpdateDetails {
                item: item.clone(),
                old_key: old_key.clone(),
                new_key,
            };
            self.lock_updates();
            self.notify(|observer| observer.on_collection_update_key(self, &details));
            self.core.hub.fire(CollectionEvent::UpdateKey(details));
            self.unlock_updates();
        }
    }

    // ------------------------------------------------------------------
    // sorting

    pub fn set_sorters(&self, sorters: Vec<Sorter<T>>) {
        self.core.state.borrow_mut().sorters.replace_all(sorters);
        if self.is_sorted() {
            self.sort_items();
        }
    }

    pub fn add_sorter(&self, sorter: Sorter<T>) {
        self.core.state.borrow_mut().sorters.upsert(sorter);
        self.sort_items();
    }

    pub fn remove_sorter(&self, id: &str) {
        let removed = self.core.state.borrow_mut().sorters.remove(id);
        if removed && self.is_sorted() {
            self.sort_items();
        }
    }

    /// Full stable resort by grouper-then-sorters order.
    pub fn sort_items(&self) {
        self.core.hub.fire(CollectionEvent::BeforeSort);
        {
            let mut state = self.core.state.borrow_mut();
            let mut items = std::mem::take(&mut state.items);
            items.sort_by(|a, b| state.compare(a, b));
            state.items = items;
            state.indices = None;
            state.generation += 1;
        }
        self.core.hub.fire(CollectionEvent::Sort);
    }

    // ------------------------------------------------------------------
    // grouping

    pub fn set_grouper(&self, grouper: Option<Grouper<T>>) {
        let old_observer = {
            let mut state = self.core.state.borrow_mut();
            state.grouper = grouper.clone();
            state.groups = None;
            state.group_observer.take()
        };
        if let Some(observer) = old_observer {
            self.remove_observer(&observer);
        }

        if let Some(grouper) = grouper {
            self.sort_items();
            let groups = Groups::new(grouper);
            let observer: Rc<dyn CollectionObserver<T>> =
                Rc::new(GroupObserver::new(groups.inner()));
            {
                let mut state = self.core.state.borrow_mut();
                state.groups = Some(groups.clone());
                state.group_observer = Some(Rc::clone(&observer));
            }
            self.add_observer(observer);
            groups.inner().rebuild(self);
        } else if !self.core.state.borrow().sorters.is_empty() {
            self.sort_items();
        }
    }

    #[must_use]
    pub fn grouper(&self) -> Option<Grouper<T>> {
        self.core.state.borrow().grouper.clone()
    }

    #[must_use]
    pub fn groups(&self) -> Option<Groups<T>> {
        self.core.state.borrow().groups.clone()
    }

    // ------------------------------------------------------------------
    // filters and sources

    pub fn add_filter(&self, filter: Filter<T>) {
        self.core.state.borrow_mut().filters.upsert(filter);
        self.filters_changed();
    }

    pub fn remove_filter(&self, id: &str) {
        let removed = self.core.state.borrow_mut().filters.remove(id);
        if removed {
            self.filters_changed();
        }
    }

    pub fn set_filters(&self, filters: Vec<Filter<T>>) {
        self.core.state.borrow_mut().filters.replace_all(filters);
        self.filters_changed();
    }

    /// First filter synthesizes the unfiltered backing collection; removing
    /// the last filter refreshes everything back in but keeps the link
    /// (drop it with [`clear_source`](Self::clear_source)).
    fn filters_changed(&self) {
        if self.source().is_none() {
            if !self.is_filtered() {
                self.notify(|observer| observer.on_collection_filter(self));
                self.core.hub.fire(CollectionEvent::Filter);
                return;
            }
            let source = Self::from_items(self.items());
            self.attach_source(&source, true);
        }
        self.rebuild_from_source();
        self.notify(|observer| observer.on_collection_filter(self));
        self.core.hub.fire(CollectionEvent::Filter);
    }

    /// Chain this collection onto an explicit source collection.
    pub fn set_source(&self, source: &Self) {
        self.detach_source();
        self.attach_source(source, false);
        self.rebuild_from_source();
    }

    /// Detach from the source collection, keeping current contents.
    pub fn clear_source(&self) {
        self.detach_source();
    }

    #[must_use]
    pub fn has_auto_source(&self) -> bool {
        self.core.state.borrow().auto_source
    }

    fn attach_source(&self, source: &Self, auto: bool) {
        let link = Rc::new(ChainLink::new(self.downgrade()));
        source.add_observer(Rc::clone(&link) as Rc<dyn CollectionObserver<T>>);
        let mut state = self.core.state.borrow_mut();
        state.source = Some(source.clone());
        state.auto_source = auto;
        state.source_link = Some(link);
    }

    fn detach_source(&self) {
        let (source, link) = {
            let mut state = self.core.state.borrow_mut();
            state.auto_source = false;
            (state.source.take(), state.source_link.take())
        };
        if let (Some(source), Some(link)) = (source, link) {
            source.remove_observer(&(link as Rc<dyn CollectionObserver<T>>));
        }
    }

    /// Repopulate from the source through this collection's filters and
    /// sort order, then report one refresh.
    pub(crate) fn rebuild_from_source(&self) {
        let Some(source) = self.source() else {
            return;
        };
        let mut items: Vec<T> = source
            .iter()
            .filter(|item| !self.is_item_filtered(item))
            .collect();
        {
            let mut state = self.core.state.borrow_mut();
            if state.sorted() {
                items.sort_by(|a, b| state.compare(a, b));
            }
            state.map = items.iter().map(|item| (item.item_key(), item.clone())).collect();
            state.items = items;
            state.indices = None;
            state.generation += 1;
        }
        self.notify(|observer| observer.on_collection_refresh(self));
        self.core.hub.fire(CollectionEvent::Refresh);
    }

    // ------------------------------------------------------------------
    // source reactions (called by the chain link)

    pub(crate) fn source_added(&self, source: &Self, details: &AddDetails<T>) {
        let requested = self.take_requested_index();
        let (invisible, visible): (Vec<T>, Vec<T>) = details
            .items
            .iter()
            .cloned()
            .partition(|item| self.is_item_filtered(item));

        if !visible.is_empty() {
            let at = requested
                .map_or_else(|| self.find_insert_index(source, details.at), |index| index.min(self.len()));
            self.splice(isize::try_from(at).unwrap_or(isize::MAX), ToRemove::Nothing, visible);
        }
        if !invisible.is_empty() {
            self.notify(|observer| observer.on_collection_filter_add(self, &invisible));
            self.core.hub.fire(CollectionEvent::FilterAdd(invisible));
        }
    }

    pub(crate) fn source_removed(&self, details: &RemoveDetails<T>) {
        let present: Vec<Key> = details
            .keys
            .iter()
            .filter(|key| self.contains_key(key))
            .cloned()
            .collect();
        if !present.is_empty() {
            self.splice(0, ToRemove::Keys(present), Vec::new());
        }
    }

    pub(crate) fn source_key_updated(&self, details: &KeyUpdateDetails<T>) {
        if self.contains_key(&details.old_key) {
            self.update_key(&details.item, &details.old_key);
        }
    }

    /// Position for items arriving at `source_at` in the source: directly
    /// after the nearest preceding source item that is visible here.
    fn find_insert_index(&self, source: &Self, source_at: usize) -> usize {
        for index in (0..source_at).rev() {
            if let Some(previous) = source.get_at(index)
                && let Some(position) = self.index_of_key(&previous.item_key())
            {
                return position + 1;
            }
        }
        0
    }

    // ------------------------------------------------------------------
    // aggregation

    /// Sum of the extracted numeric values; non-numeric values are skipped.
    pub fn sum_by(&self, extract: impl Fn(&T) -> Value) -> f64 {
        self.core
            .state
            .borrow()
            .items
            .iter()
            .filter_map(|item| extract(item).as_f64())
            .sum()
    }

    pub fn average_by(&self, extract: impl Fn(&T) -> Value) -> Option<f64> {
        let state = self.core.state.borrow();
        let values: Vec<f64> = state
            .items
            .iter()
            .filter_map(|item| extract(item).as_f64())
            .collect();
        if values.is_empty() {
            None
        } else {
            #[allow(clippy::cast_precision_loss)]
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn min_by(&self, extract: impl Fn(&T) -> Value) -> Option<f64> {
        self.core
            .state
            .borrow()
            .items
            .iter()
            .filter_map(|item| extract(item).as_f64())
            .min_by(f64::total_cmp)
    }

    pub fn max_by(&self, extract: impl Fn(&T) -> Value) -> Option<f64> {
        self.core
            .state
            .borrow()
            .items
            .iter()
            .filter_map(|item| extract(item).as_f64())
            .max_by(f64::total_cmp)
    }

    /// Sum over `[begin, end)`. An inverted or out-of-bounds range is a
    /// caller bug; debug builds panic, release builds clamp.
    pub fn sum_range(&self, begin: usize, end: usize, extract: impl Fn(&T) -> Value) -> f64 {
        let state = self.core.state.borrow();
        #[cfg(debug_assertions)]
        {
            assert!(
                begin <= end && end <= state.items.len(),
                "invalid aggregate range {begin}..{end} over {} items",
                state.items.len()
            );
        }
        let end = end.min(state.items.len());
        let begin = begin.min(end);
        state.items[begin..end]
            .iter()
            .filter_map(|item| extract(item).as_f64())
            .sum()
    }
}

/// Ascending sorted indices -> (start, count) chunks.
fn coalesce(indices: &[usize]) -> Vec<(usize, usize)> {
    let mut chunks: Vec<(usize, usize)> = Vec::new();
    for &index in indices {
        match chunks.last_mut() {
            Some((start, count)) if *start + *count == index => *count += 1,
            _ => chunks.push((index, 1)),
        }
    }
    chunks
}
