use crate::collection::Item;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::rc::Rc;

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

///
/// Sorter
///
/// Named comparator. `by` builds the common case of sorting on an
/// extracted [`Value`]; `new` accepts an arbitrary comparator.
///

#[derive(Clone)]
pub struct Sorter<T: Item> {
    id: String,
    compare: Rc<dyn Fn(&T, &T) -> Ordering>,
    direction: Direction,
}

impl<T: Item> Sorter<T> {
    pub fn new(id: impl Into<String>, compare: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
        Self {
            id: id.into(),
            compare: Rc::new(compare),
            direction: Direction::Asc,
        }
    }

    pub fn by(
        id: impl Into<String>,
        extract: impl Fn(&T) -> Value + 'static,
        direction: Direction,
    ) -> Self {
        Self {
            id: id.into(),
            compare: Rc::new(move |a, b| extract(a).compare(&extract(b))),
            direction,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.direction.apply((self.compare)(a, b))
    }
}

///
/// SorterSet
///
/// Lexicographic multi-key comparator: earlier sorters win, later ones
/// break ties.
///

pub struct SorterSet<T: Item> {
    sorters: Vec<Sorter<T>>,
}

impl<T: Item> Default for SorterSet<T> {
    fn default() -> Self {
        Self { sorters: Vec::new() }
    }
}

impl<T: Item> SorterSet<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sorters.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sorters.len()
    }

    pub fn upsert(&mut self, sorter: Sorter<T>) {
        match self.sorters.iter_mut().find(|s| s.id == sorter.id) {
            Some(slot) => *slot = sorter,
            None => self.sorters.push(sorter),
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.sorters.len();
        self.sorters.retain(|sorter| sorter.id != id);
        self.sorters.len() < before
    }

    pub fn clear(&mut self) {
        self.sorters.clear();
    }

    pub fn replace_all(&mut self, sorters: Vec<Sorter<T>>) {
        self.sorters = sorters;
    }

    #[must_use]
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        for sorter in &self.sorters {
            let ordering = sorter.compare(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    #[derive(Clone)]
    struct Row(&'static str, i64, i64);

    impl Item for Row {
        fn item_key(&self) -> Key {
            Key::from(self.0)
        }
    }

    #[test]
    fn later_sorters_break_ties() {
        let mut set = SorterSet::default();
        set.upsert(Sorter::by("a", |r: &Row| Value::Int(r.1), Direction::Asc));
        set.upsert(Sorter::by("b", |r: &Row| Value::Int(r.2), Direction::Desc));

        assert_eq!(set.compare(&Row("x", 1, 5), &Row("y", 2, 0)), Ordering::Less);
        assert_eq!(set.compare(&Row("x", 1, 5), &Row("y", 1, 9)), Ordering::Greater);
    }

    #[test]
    fn direction_reverses() {
        let sorter = Sorter::by("n", |r: &Row| Value::Int(r.1), Direction::Desc);
        assert_eq!(sorter.compare(&Row("x", 1, 0), &Row("y", 2, 0)), Ordering::Greater);
    }
}
