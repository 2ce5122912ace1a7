use crate::collection::Item;
use std::rc::Rc;

///
/// Filter
///
/// Named predicate over items. The id lets callers replace or remove a
/// filter without holding onto the closure.
///

#[derive(Clone)]
pub struct Filter<T: Item> {
    id: String,
    predicate: Rc<dyn Fn(&T) -> bool>,
}

impl<T: Item> Filter<T> {
    pub fn new(id: impl Into<String>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            id: id.into(),
            predicate: Rc::new(predicate),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn matches(&self, item: &T) -> bool {
        (self.predicate)(item)
    }
}

///
/// FilterSet
///
/// Conjunction of filters. An item is visible only when every filter
/// matches it; an empty set matches everything.
///

pub struct FilterSet<T: Item> {
    filters: Vec<Filter<T>>,
}

impl<T: Item> Default for FilterSet<T> {
    fn default() -> Self {
        Self { filters: Vec::new() }
    }
}

impl<T: Item> FilterSet<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Add or replace by id.
    pub fn upsert(&mut self, filter: Filter<T>) {
        match self.filters.iter_mut().find(|f| f.id == filter.id) {
            Some(slot) => *slot = filter,
            None => self.filters.push(filter),
        }
    }

    /// Remove by id; reports whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|filter| filter.id != id);
        self.filters.len() < before
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn replace_all(&mut self, filters: Vec<Filter<T>>) {
        self.filters = filters;
    }

    #[must_use]
    pub fn matches(&self, item: &T) -> bool {
        self.filters.iter().all(|filter| filter.matches(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    #[derive(Clone)]
    struct Tag(&'static str, i64);

    impl Item for Tag {
        fn item_key(&self) -> Key {
            Key::from(self.0)
        }
    }

    #[test]
    fn empty_set_matches_everything() {
        let set = FilterSet::<Tag>::default();
        assert!(set.matches(&Tag("a", 0)));
    }

    #[test]
    fn filters_conjoin() {
        let mut set = FilterSet::default();
        set.upsert(Filter::new("pos", |t: &Tag| t.1 > 0));
        set.upsert(Filter::new("small", |t: &Tag| t.1 < 10));

        assert!(set.matches(&Tag("a", 5)));
        assert!(!set.matches(&Tag("b", -1)));
        assert!(!set.matches(&Tag("c", 50)));
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut set = FilterSet::default();
        set.upsert(Filter::new("f", |t: &Tag| t.1 > 0));
        set.upsert(Filter::new("f", |t: &Tag| t.1 < 0));

        assert_eq!(set.len(), 1);
        assert!(set.matches(&Tag("a", -1)));
    }
}
