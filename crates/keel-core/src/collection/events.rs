use crate::collection::Item;
use crate::event::EventPayload;
use crate::key::Key;

///
/// AddDetails
///
/// One contiguous run of items entering the collection at `at`.
///

#[derive(Clone, Debug)]
pub struct AddDetails<T: Item> {
    pub at: usize,
    pub items: Vec<T>,
    pub keys: Vec<Key>,
}

///
/// RemoveDetails
///
/// One contiguous run of items leaving the collection. `at` is the index
/// the run occupied when it was removed.
///

#[derive(Clone, Debug)]
pub struct RemoveDetails<T: Item> {
    pub at: usize,
    pub items: Vec<T>,
    pub keys: Vec<Key>,
}

///
/// ItemChangeDetails
///
/// Everything known about one in-place item mutation.
///

#[derive(Clone, Debug)]
pub struct ItemChangeDetails<T: Item> {
    pub item: T,
    pub key: Key,
    pub old_key: Option<Key>,
    pub modified: Vec<String>,
    /// The change flipped the item's filter status at this level.
    pub filter_changed: bool,
    pub key_changed: bool,
    pub index_changed: bool,
    /// The item is invisible at this level after the change.
    pub filtered: bool,
    pub was_filtered: bool,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
}

///
/// KeyUpdateDetails
///

#[derive(Clone, Debug)]
pub struct KeyUpdateDetails<T: Item> {
    pub item: T,
    pub old_key: Key,
    pub new_key: Key,
}

///
/// CollectionEvent
///
/// Public event vocabulary fired through a collection's hub.
///

#[derive(Clone, Debug)]
pub enum CollectionEvent<T: Item> {
    BeginUpdate,
    EndUpdate,
    Add(AddDetails<T>),
    Remove(RemoveDetails<T>),
    BeforeItemChange(ItemChangeDetails<T>),
    ItemChange(ItemChangeDetails<T>),
    FilteredItemChange(ItemChangeDetails<T>),
    Refresh,
    BeforeSort,
    Sort,
    Filter,
    /// Items arriving from the source that are filtered out at this level.
    FilterAdd(Vec<T>),
    UpdateKey(KeyUpdateDetails<T>),
}

impl<T: Item> EventPayload for CollectionEvent<T> {
    fn event_name(&self) -> &'static str {
        match self {
            Self::BeginUpdate => "beginupdate",
            Self::EndUpdate => "endupdate",
            Self::Add(_) => "add",
            Self::Remove(_) => "remove",
            Self::BeforeItemChange(_) => "beforeitemchange",
            Self::ItemChange(_) => "itemchange",
            Self::FilteredItemChange(_) => "filtereditemchange",
            Self::Refresh => "refresh",
            Self::BeforeSort => "beforesort",
            Self::Sort => "sort",
            Self::Filter => "filter",
            Self::FilterAdd(_) => "filteradd",
            Self::UpdateKey(_) => "updatekey",
        }
    }
}
