use crate::collection::base::{Collection, ToRemove};
use crate::collection::events::{AddDetails, ItemChangeDetails, KeyUpdateDetails, RemoveDetails};
use crate::collection::observer::CollectionObserver;
use crate::collection::sorter::Direction;
use crate::collection::Item;
use crate::key::Key;
use crate::value::Value;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

///
/// Grouper
///
/// Extracts one grouping value per item. A grouped collection sorts by the
/// grouping value first, so members of one group are always contiguous.
///

#[derive(Clone)]
pub struct Grouper<T: Item> {
    extract: Rc<dyn Fn(&T) -> Value>,
    direction: Direction,
}

impl<T: Item> Grouper<T> {
    pub fn by(extract: impl Fn(&T) -> Value + 'static, direction: Direction) -> Self {
        Self {
            extract: Rc::new(extract),
            direction,
        }
    }

    #[must_use]
    pub fn group_value(&self, item: &T) -> Value {
        (self.extract)(item)
    }

    #[must_use]
    pub fn group_key(&self, item: &T) -> Key {
        Key::from(self.group_value(item).to_string())
    }

    #[must_use]
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.direction
            .apply(self.group_value(a).compare(&self.group_value(b)))
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    fn compare_values(&self, a: &Value, b: &Value) -> Ordering {
        self.direction.apply(a.compare(b))
    }
}

struct Member<T: Item> {
    value: Value,
    key: Key,
    items: Collection<T>,
}

struct GroupsState<T: Item> {
    members: Vec<Member<T>>,
    /// Item key -> group key, so removals and moves find the old group
    /// without re-extracting from a mutated item.
    by_item: HashMap<Key, Key>,
}

pub(crate) struct GroupsInner<T: Item> {
    grouper: Grouper<T>,
    state: RefCell<GroupsState<T>>,
}

///
/// Groups
///
/// The live per-group member collections of a grouped collection, ordered
/// by grouping value in the grouper's direction.
///

#[derive(Clone)]
pub struct Groups<T: Item> {
    inner: Rc<GroupsInner<T>>,
}

impl<T: Item> Groups<T> {
    pub(crate) fn new(grouper: Grouper<T>) -> Self {
        Self {
            inner: Rc::new(GroupsInner {
                grouper,
                state: RefCell::new(GroupsState {
                    members: Vec::new(),
                    by_item: HashMap::new(),
                }),
            }),
        }
    }

    pub(crate) fn inner(&self) -> Rc<GroupsInner<T>> {
        Rc::clone(&self.inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.borrow().members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().members.is_empty()
    }

    /// Group keys in grouping order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.inner
            .state
            .borrow()
            .members
            .iter()
            .map(|member| member.key.clone())
            .collect()
    }

    /// Member collection for one group key.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<Collection<T>> {
        self.inner
            .state
            .borrow()
            .members
            .iter()
            .find(|member| member.key == *key)
            .map(|member| member.items.clone())
    }

    /// Group the item would belong to, whether or not it is present.
    #[must_use]
    pub fn key_for(&self, item: &T) -> Key {
        self.inner.grouper.group_key(item)
    }
}

impl<T: Item> GroupsInner<T> {
    fn add_item(&self, item: &T) {
        let value = self.grouper.group_value(item);
        let key = Key::from(value.to_string());

        let group = {
            let mut state = self.state.borrow_mut();
            state.by_item.insert(item.item_key(), key.clone());
            match state.members.iter().find(|member| member.key == key) {
                Some(member) => member.items.clone(),
                None => {
                    let items = Collection::new();
                    let at = state
                        .members
                        .partition_point(|member| self.grouper.compare_values(&member.value, &value) != Ordering::Greater);
                    state.members.insert(
                        at,
                        Member {
                            value,
                            key,
                            items: items.clone(),
                        },
                    );
                    items
                }
            }
        };
        group.add(vec![item.clone()]);
    }

    fn remove_item(&self, item_key: &Key) {
        let group = {
            let mut state = self.state.borrow_mut();
            let Some(group_key) = state.by_item.remove(item_key) else {
                return;
            };
            state
                .members
                .iter()
                .find(|member| member.key == group_key)
                .map(|member| member.items.clone())
        };
        if let Some(group) = group {
            group.splice(0, ToRemove::Keys(vec![item_key.clone()]), Vec::new());
            if group.is_empty() {
                self.drop_group_of(item_key, &group);
            }
        }
    }

    fn drop_group_of(&self, _item_key: &Key, group: &Collection<T>) {
        let mut state = self.state.borrow_mut();
        state.members.retain(|member| !member.items.ptr_eq(group));
    }

    pub(crate) fn rebuild(&self, source: &Collection<T>) {
        {
            let mut state = self.state.borrow_mut();
            state.members.clear();
            state.by_item.clear();
        }
        for item in source.iter() {
            self.add_item(&item);
        }
    }

    fn item_changed(&self, details: &ItemChangeDetails<T>) {
        let old_item_key = details.old_key.clone().unwrap_or_else(|| details.key.clone());
        let new_group = self.grouper.group_key(&details.item);
        let old_group = self.state.borrow().by_item.get(&old_item_key).cloned();

        match old_group {
            Some(old_group) if old_group == new_group && !details.key_changed => {}
            _ => {
                self.remove_item(&old_item_key);
                if !details.filtered {
                    self.add_item(&details.item);
                }
            }
        }
    }

    fn key_updated(&self, details: &KeyUpdateDetails<T>) {
        self.remove_item(&details.old_key);
        self.add_item(&details.item);
    }
}

///
/// GroupObserver
///
/// Keeps the group map in step with its parent collection. Runs at
/// priority -200 so groups are already correct when other observers and
/// the public events see the change.
///

pub(crate) struct GroupObserver<T: Item> {
    groups: Rc<GroupsInner<T>>,
}

impl<T: Item> GroupObserver<T> {
    pub(crate) fn new(groups: Rc<GroupsInner<T>>) -> Self {
        Self { groups }
    }
}

impl<T: Item> CollectionObserver<T> for GroupObserver<T> {
    fn priority(&self) -> i32 {
        -200
    }

    fn on_collection_add(&self, _source: &Collection<T>, details: &AddDetails<T>) {
        for item in &details.items {
            self.groups.add_item(item);
        }
    }

    fn on_collection_remove(&self, _source: &Collection<T>, details: &RemoveDetails<T>) {
        for key in &details.keys {
            self.groups.remove_item(key);
        }
    }

    fn on_collection_item_change(&self, _source: &Collection<T>, details: &ItemChangeDetails<T>) {
        self.groups.item_changed(details);
    }

    fn on_collection_update_key(&self, _source: &Collection<T>, details: &KeyUpdateDetails<T>) {
        self.groups.key_updated(details);
    }

    fn on_collection_refresh(&self, source: &Collection<T>) {
        self.groups.rebuild(source);
    }
}
