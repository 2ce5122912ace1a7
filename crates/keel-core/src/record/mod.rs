mod joined;

pub use joined::JoinedObserver;

use crate::error::RecordError;
use crate::key::Key;
use crate::schema::{FieldReader, Schema};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use ulid::Ulid;

///
/// SetOptions
///

#[derive(Clone, Copy, Debug)]
pub struct SetOptions {
    /// Run field converters over incoming values.
    pub convert: bool,
    /// Track changes in the modified baseline (dirty state).
    pub dirty: bool,
    /// Commit immediately (and silently) after the writes apply.
    pub commit: bool,
    /// Suppress the `after_edit` notification.
    pub silent: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            convert: true,
            dirty: true,
            commit: false,
            silent: false,
        }
    }
}

impl SetOptions {
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    #[must_use]
    pub const fn no_convert(mut self) -> Self {
        self.convert = false;
        self
    }

    #[must_use]
    pub const fn untracked(mut self) -> Self {
        self.dirty = false;
        self
    }

    #[must_use]
    pub const fn committing(mut self) -> Self {
        self.commit = true;
        self
    }
}

struct Memento {
    data: Vec<Value>,
    modified: HashMap<usize, Value>,
    dirty: bool,
    phantom: bool,
}

struct RecordInner {
    schema: Rc<Schema>,
    /// Field values indexed by schema ordinal.
    data: Vec<Value>,
    id: Key,
    phantom: bool,
    dirty: bool,
    dropped: bool,
    erased: bool,
    editing: bool,
    /// Ordinal -> original value, first write wins. Empty means clean.
    modified: HashMap<usize, Value>,
    /// Ordinal -> value before the most recent change.
    previous: HashMap<usize, Value>,
    generation: u64,
    memento: Option<Memento>,
    joined: Vec<Weak<dyn JoinedObserver>>,
}

struct DataReader<'a> {
    schema: &'a Schema,
    data: &'a [Value],
}

impl FieldReader for DataReader<'_> {
    fn read(&self, name: &str) -> Option<&Value> {
        self.schema.ordinal(name).map(|ordinal| &self.data[ordinal])
    }
}

thread_local! {
    static INTERNAL_SEQ: Cell<u64> = const { Cell::new(0) };
}

fn next_internal_id() -> Ulid {
    INTERNAL_SEQ.with(|seq| {
        let n = seq.get() + 1;
        seq.set(n);
        Ulid::from_parts(0, u128::from(n))
    })
}

///
/// Record
///
/// Shared handle to one schema-typed record. Values live in a `Vec<Value>`
/// at the schema's fixed ordinals; per-field dirtiness is the `modified`
/// baseline map; computed fields recompute lowest-rank-first when a
/// dependency changes. All mutation computes on a local copy and publishes
/// under a short borrow, so joined observers may re-enter freely.
///

#[derive(Clone)]
pub struct Record {
    inner: Rc<RefCell<RecordInner>>,
}

impl Record {
    /// Fresh phantom record carrying only field defaults.
    #[must_use]
    pub fn new(schema: Rc<Schema>) -> Self {
        Self::build(schema, None)
    }

    /// Load from keyed raw values. Unknown names are rejected.
    pub fn load<I, N>(schema: Rc<Schema>, raw: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = (N, Value)>,
        N: AsRef<str>,
    {
        let mut row: Vec<Option<Value>> = vec![None; schema.len()];
        for (name, value) in raw {
            let ordinal = schema
                .ordinal(name.as_ref())
                .ok_or_else(|| RecordError::UnknownField {
                    schema: schema.name().to_string(),
                    name: name.as_ref().to_string(),
                })?;
            row[ordinal] = Some(value);
        }
        Ok(Self::build(schema, Some(row)))
    }

    /// Load from a positional row in ordinal order. Extra values are
    /// ignored, missing ones default.
    #[must_use]
    pub fn load_row(schema: Rc<Schema>, row: Vec<Value>) -> Self {
        let mut raw: Vec<Option<Value>> = vec![None; schema.len()];
        for (ordinal, value) in row.into_iter().take(raw.len()).enumerate() {
            raw[ordinal] = Some(value);
        }
        Self::build(schema, Some(raw))
    }

    fn build(schema: Rc<Schema>, raw: Option<Vec<Option<Value>>>) -> Self {
        let raw = raw.unwrap_or_else(|| vec![None; schema.len()]);
        let mut data = vec![Value::Null; schema.len()];

        // Converters run in rank order so dependencies are already
        // converted when a computed field reads them.
        for &ordinal in schema.ranked() {
            let value = {
                let reader = DataReader {
                    schema: &schema,
                    data: &data,
                };
                schema.field_at(ordinal).apply_convert(raw[ordinal].as_ref(), &reader)
            };
            data[ordinal] = value;
        }

        let internal = next_internal_id();
        let (id, phantom) = match data[schema.id_ordinal()].as_key() {
            Some(key) => (key, false),
            None => (Key::from(internal.to_string()), true),
        };

        Self {
            inner: Rc::new(RefCell::new(RecordInner {
                schema,
                data,
                id,
                phantom,
                dirty: false,
                dropped: false,
                erased: false,
                editing: false,
                modified: HashMap::new(),
                previous: HashMap::new(),
                generation: 1,
                memento: None,
                joined: Vec::new(),
            })),
        }
    }

    // ------------------------------------------------------------------
    // accessors

    #[must_use]
    pub fn schema(&self) -> Rc<Schema> {
        Rc::clone(&self.inner.borrow().schema)
    }

    #[must_use]
    pub fn id(&self) -> Key {
        self.inner.borrow().id.clone()
    }

    /// Current value of the named field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        inner.schema.ordinal(name).map(|ordinal| inner.data[ordinal].clone())
    }

    /// Baseline value the field had before it went dirty.
    #[must_use]
    pub fn get_modified(&self, name: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        let ordinal = inner.schema.ordinal(name)?;
        inner.modified.get(&ordinal).cloned()
    }

    /// Last committed value: the dirty baseline when the field is modified,
    /// the current value otherwise.
    #[must_use]
    pub fn peek(&self, name: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        let ordinal = inner.schema.ordinal(name)?;
        Some(
            inner
                .modified
                .get(&ordinal)
                .unwrap_or(&inner.data[ordinal])
                .clone(),
        )
    }

    /// Value the field held before its most recent change.
    #[must_use]
    pub fn get_previous(&self, name: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        let ordinal = inner.schema.ordinal(name)?;
        inner.previous.get(&ordinal).cloned()
    }

    #[must_use]
    pub fn is_modified(&self, name: &str) -> bool {
        let inner = self.inner.borrow();
        inner
            .schema
            .ordinal(name)
            .is_some_and(|ordinal| inner.modified.contains_key(&ordinal))
    }

    /// Names of all dirty fields, in ordinal order.
    #[must_use]
    pub fn modified_names(&self) -> Vec<String> {
        let inner = self.inner.borrow();
        let mut ordinals: Vec<usize> = inner.modified.keys().copied().collect();
        ordinals.sort_unstable();
        ordinals
            .into_iter()
            .map(|ordinal| inner.schema.field_at(ordinal).name.clone())
            .collect()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty
    }

    #[must_use]
    pub fn is_phantom(&self) -> bool {
        self.inner.borrow().phantom
    }

    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.inner.borrow().dropped
    }

    #[must_use]
    pub fn is_erased(&self) -> bool {
        self.inner.borrow().erased
    }

    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.inner.borrow().editing
    }

    /// Identity comparison: two handles to the same record.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // joined observers

    pub fn join(&self, observer: &Rc<dyn JoinedObserver>) {
        self.inner.borrow_mut().joined.push(Rc::downgrade(observer));
    }

    pub fn unjoin(&self, observer: &Rc<dyn JoinedObserver>) {
        self.inner.borrow_mut().joined.retain(|weak| {
            weak.upgrade()
                .is_some_and(|live| !Rc::ptr_eq(&live, observer))
        });
    }

    fn notify(&self, call: impl Fn(&dyn JoinedObserver)) {
        let observers: Vec<Rc<dyn JoinedObserver>> = {
            let mut inner = self.inner.borrow_mut();
            inner.joined.retain(|weak| weak.strong_count() > 0);
            inner.joined.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            call(observer.as_ref());
        }
    }

    // ------------------------------------------------------------------
    // mutation

    /// Set one field with default options.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Option<Vec<String>>, RecordError> {
        self.set_all(vec![(name.to_string(), value.into())], SetOptions::default())
    }

    /// Set one field with explicit options.
    pub fn set_with(
        &self,
        name: &str,
        value: impl Into<Value>,
        options: SetOptions,
    ) -> Result<Option<Vec<String>>, RecordError> {
        self.set_all(vec![(name.to_string(), value.into())], options)
    }

    /// Apply a batch of writes, cascade computed fields, and notify.
    ///
    /// Returns the names of the fields that changed, in write order with
    /// cascaded fields appended, or `None` when nothing changed.
    pub fn set_all(
        &self,
        writes: Vec<(String, Value)>,
        options: SetOptions,
    ) -> Result<Option<Vec<String>>, RecordError> {
        let (schema, mut data, mut modified, mut previous, editing, old_id) = {
            let inner = self.inner.borrow();
            (
                Rc::clone(&inner.schema),
                inner.data.clone(),
                inner.modified.clone(),
                inner.previous.clone(),
                inner.editing,
                inner.id.clone(),
            )
        };

        let mut changed: Vec<usize> = Vec::new();
        let mut recompute = vec![false; schema.len()];

        for (name, raw) in writes {
            let ordinal = schema
                .ordinal(&name)
                .ok_or_else(|| RecordError::UnknownField {
                    schema: schema.name().to_string(),
                    name,
                })?;
            let value = if options.convert {
                let reader = DataReader {
                    schema: &schema,
                    data: &data,
                };
                schema.field_at(ordinal).apply_convert(Some(&raw), &reader)
            } else {
                raw
            };
            Self::write_field(
                &schema,
                ordinal,
                value,
                options,
                &mut data,
                &mut modified,
                &mut previous,
                &mut changed,
                &mut recompute,
            );
        }

        // Cascade in rank order. Dependents always rank above the fields
        // they read, so one pass recomputes each flagged field exactly once.
        for &ordinal in schema.ranked() {
            if !recompute[ordinal] {
                continue;
            }
            recompute[ordinal] = false;
            let value = {
                let reader = DataReader {
                    schema: &schema,
                    data: &data,
                };
                schema
                    .field_at(ordinal)
                    .apply_convert(Some(&data[ordinal]), &reader)
            };
            Self::write_field(
                &schema,
                ordinal,
                value,
                options,
                &mut data,
                &mut modified,
                &mut previous,
                &mut changed,
                &mut recompute,
            );
        }

        if changed.is_empty() {
            return Ok(None);
        }

        let id_change = if changed.contains(&schema.id_ordinal()) {
            let new_id = data[schema.id_ordinal()]
                .as_key()
                .ok_or_else(|| RecordError::InvalidId {
                    schema: schema.name().to_string(),
                    value: data[schema.id_ordinal()].to_string(),
                })?;
            (new_id != old_id).then_some(new_id)
        } else {
            None
        };

        let mut names: Vec<String> = Vec::with_capacity(changed.len());
        let mut seen = vec![false; schema.len()];
        for &ordinal in &changed {
            if !seen[ordinal] {
                seen[ordinal] = true;
                names.push(schema.field_at(ordinal).name.clone());
            }
        }

        {
            let mut inner = self.inner.borrow_mut();
            inner.dirty = !modified.is_empty();
            inner.data = data;
            inner.modified = modified;
            inner.previous = previous;
            inner.generation += 1;
            if let Some(new_id) = &id_change {
                inner.id = new_id.clone();
            }
        }

        if let Some(new_id) = &id_change {
            self.notify(|observer| observer.id_changed(self, &old_id, new_id));
        }
        if !options.silent && !editing {
            self.notify(|observer| observer.after_edit(self, &names));
        }
        if options.commit {
            self.commit_with(true);
        }

        Ok(Some(names))
    }

    #[allow(clippy::too_many_arguments)]
    fn write_field(
        schema: &Schema,
        ordinal: usize,
        value: Value,
        options: SetOptions,
        data: &mut [Value],
        modified: &mut HashMap<usize, Value>,
        previous: &mut HashMap<usize, Value>,
        changed: &mut Vec<usize>,
        recompute: &mut [bool],
    ) {
        let field = schema.field_at(ordinal);
        let old = &data[ordinal];

        if *old == value {
            // Critical fields report as modified even when the value is
            // unchanged.
            if field.critical {
                if options.dirty && field.persist && !modified.contains_key(&ordinal) {
                    modified.insert(ordinal, old.clone());
                }
                changed.push(ordinal);
            }
            return;
        }

        previous.insert(ordinal, old.clone());
        if options.dirty && field.persist {
            match modified.get(&ordinal) {
                Some(baseline) if *baseline == value => {
                    modified.remove(&ordinal);
                }
                Some(_) => {}
                None => {
                    modified.insert(ordinal, old.clone());
                }
            }
        }
        data[ordinal] = value;
        changed.push(ordinal);
        for &dependent in field.dependents() {
            recompute[dependent] = true;
        }
    }

    /// Accept all pending changes as the new baseline.
    pub fn commit(&self) {
        self.commit_with(false);
    }

    pub fn commit_with(&self, silent: bool) {
        let erased_now = {
            let mut inner = self.inner.borrow_mut();
            inner.modified.clear();
            inner.dirty = false;
            if let Some(ordinal) = inner.schema.version_ordinal()
                && !inner.phantom
            {
                let next = inner.data[ordinal].as_i64().unwrap_or(0) + 1;
                inner.data[ordinal] = Value::Int(next);
            }
            inner.phantom = false;
            if inner.dropped {
                inner.erased = true;
            }
            inner.generation += 1;
            inner.erased
        };

        if !silent {
            if erased_now {
                self.notify(|observer| observer.after_erase(self));
            } else {
                self.notify(|observer| observer.after_commit(self));
            }
        }
    }

    /// Revert every dirty field to its baseline value.
    pub fn reject(&self) -> Result<(), RecordError> {
        self.reject_with(false)
    }

    pub fn reject_with(&self, silent: bool) -> Result<(), RecordError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.erased {
                return Err(RecordError::RejectErased);
            }
            let restored: Vec<(usize, Value)> = inner.modified.drain().collect();
            for (ordinal, original) in restored {
                let current = inner.data[ordinal].clone();
                inner.previous.insert(ordinal, current);
                inner.data[ordinal] = original;
            }
            inner.dirty = false;
            inner.dropped = false;
            if !inner.phantom
                && let Some(key) = inner.data[inner.schema.id_ordinal()].as_key()
            {
                inner.id = key;
            }
            inner.generation += 1;
        }

        if !silent {
            self.notify(|observer| observer.after_reject(self));
        }
        Ok(())
    }

    /// Mark the record for deletion. Phantom records erase immediately.
    pub fn drop_record(&self, silent: bool) {
        let erased_now = {
            let mut inner = self.inner.borrow_mut();
            if inner.dropped {
                return;
            }
            inner.dropped = true;
            if inner.phantom {
                inner.erased = true;
            }
            inner.generation += 1;
            inner.erased
        };

        if !silent {
            self.notify(|observer| observer.after_drop(self));
            if erased_now {
                self.notify(|observer| observer.after_erase(self));
            }
        }
    }

    // ------------------------------------------------------------------
    // edit sessions

    /// Open an edit session: changes stop notifying and can be rolled back.
    pub fn begin_edit(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.editing {
            return;
        }
        inner.editing = true;
        inner.memento = Some(Memento {
            data: inner.data.clone(),
            modified: inner.modified.clone(),
            dirty: inner.dirty,
            phantom: inner.phantom,
        });
    }

    /// Roll the session back to its starting snapshot.
    pub fn cancel_edit(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.editing {
            return;
        }
        inner.editing = false;
        if let Some(memento) = inner.memento.take() {
            inner.data = memento.data;
            inner.modified = memento.modified;
            inner.dirty = memento.dirty;
            inner.phantom = memento.phantom;
            inner.generation += 1;
        }
    }

    /// Close the session and notify once with everything that changed.
    ///
    /// With `modified` given, that list is reported as-is; otherwise the
    /// diff against the session snapshot is computed.
    pub fn end_edit(&self, silent: bool, modified: Option<Vec<String>>) -> Option<Vec<String>> {
        let (names, dirty) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.editing {
                return None;
            }
            inner.editing = false;
            let memento = inner.memento.take();

            let names = modified.unwrap_or_else(|| {
                memento.as_ref().map_or_else(Vec::new, |memento| {
                    inner
                        .data
                        .iter()
                        .zip(memento.data.iter())
                        .enumerate()
                        .filter(|(_, (now, then))| now != then)
                        .map(|(ordinal, _)| inner.schema.field_at(ordinal).name.clone())
                        .collect()
                })
            });
            (names, inner.dirty)
        };

        if !silent && (dirty || !names.is_empty()) {
            self.notify(|observer| observer.after_edit(self, &names));
        }
        (!names.is_empty()).then_some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType};

    fn user_schema() -> Rc<Schema> {
        Schema::builder("user")
            .field(Field::new("name", FieldType::Text))
            .field(Field::new("age", FieldType::Int))
            .build()
            .expect("schema")
    }

    fn calc_schema() -> Rc<Schema> {
        Schema::builder("calc")
            .field(Field::new("a", FieldType::Int))
            .field(
                Field::new("b", FieldType::Int)
                    .convert(|_, reader| {
                        let a = reader.read("a").and_then(Value::as_i64).unwrap_or(0);
                        Value::Int(a * 2)
                    })
                    .depends(&["a"]),
            )
            .build()
            .expect("schema")
    }

    #[derive(Default)]
    struct Probe {
        log: RefCell<Vec<String>>,
    }

    impl JoinedObserver for Probe {
        fn after_edit(&self, _record: &Record, modified: &[String]) {
            self.log.borrow_mut().push(format!("edit:{}", modified.join(",")));
        }
        fn after_commit(&self, _record: &Record) {
            self.log.borrow_mut().push("commit".into());
        }
        fn after_reject(&self, _record: &Record) {
            self.log.borrow_mut().push("reject".into());
        }
        fn after_drop(&self, _record: &Record) {
            self.log.borrow_mut().push("drop".into());
        }
        fn after_erase(&self, _record: &Record) {
            self.log.borrow_mut().push("erase".into());
        }
        fn id_changed(&self, _record: &Record, old: &Key, new: &Key) {
            self.log.borrow_mut().push(format!("id:{old}->{new}"));
        }
    }

    fn joined(record: &Record) -> Rc<Probe> {
        let probe = Rc::new(Probe::default());
        let observer: Rc<dyn JoinedObserver> = probe.clone();
        record.join(&observer);
        probe
    }

    #[test]
    fn load_converts_and_detects_identity() {
        let record = Record::load(
            user_schema(),
            [
                ("id".to_string(), Value::Int(7)),
                ("age".to_string(), Value::Text("30".into())),
            ],
        )
        .expect("load");

        assert_eq!(record.id(), Key::from("7"));
        assert!(!record.is_phantom());
        assert_eq!(record.get("age"), Some(Value::Int(30)));
        assert_eq!(record.generation(), 1);
    }

    #[test]
    fn missing_id_makes_a_phantom() {
        let record = Record::load(user_schema(), [("name".to_string(), Value::from("ann"))]).expect("load");
        assert!(record.is_phantom());
        assert!(!record.id().is_empty());
    }

    #[test]
    fn unknown_field_is_rejected_on_load_and_set() {
        assert!(matches!(
            Record::load(user_schema(), [("ghost".to_string(), Value::Int(1))]),
            Err(RecordError::UnknownField { .. })
        ));

        let record = Record::new(user_schema());
        assert!(matches!(
            record.set("ghost", 1),
            Err(RecordError::UnknownField { .. })
        ));
    }

    #[test]
    fn dirty_baseline_is_first_write_wins() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1)), ("age".to_string(), Value::Int(30))])
            .expect("load");

        record.set("age", 31).expect("set");
        record.set("age", 32).expect("set");
        assert!(record.is_dirty());
        assert_eq!(record.get_modified("age"), Some(Value::Int(30)));
        assert_eq!(record.get_previous("age"), Some(Value::Int(31)));

        // Returning to the baseline clears the entry and the dirty flag.
        record.set("age", 30).expect("set");
        assert!(!record.is_dirty());
        assert_eq!(record.get_modified("age"), None);
    }

    #[test]
    fn peek_reads_through_pending_changes() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1)), ("age".to_string(), Value::Int(30))])
            .expect("load");

        assert_eq!(record.peek("age"), Some(Value::Int(30)));
        record.set("age", 40).expect("set");
        assert_eq!(record.get("age"), Some(Value::Int(40)));
        assert_eq!(record.peek("age"), Some(Value::Int(30)));

        record.commit();
        assert_eq!(record.peek("age"), Some(Value::Int(40)));
    }

    #[test]
    fn dependents_recompute_after_their_dependency() {
        let record = Record::load(calc_schema(), [("id".to_string(), Value::Int(1)), ("a".to_string(), Value::Int(3))])
            .expect("load");
        assert_eq!(record.get("b"), Some(Value::Int(6)));

        let names = record.set("a", 5).expect("set").expect("changed");
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(record.get("b"), Some(Value::Int(10)));
    }

    #[test]
    fn set_notifies_joined_once_per_batch() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1))]).expect("load");
        let probe = joined(&record);

        record
            .set_all(
                vec![
                    ("name".to_string(), Value::from("ann")),
                    ("age".to_string(), Value::Int(30)),
                ],
                SetOptions::default(),
            )
            .expect("set");

        assert_eq!(*probe.log.borrow(), vec!["edit:name,age".to_string()]);
    }

    #[test]
    fn silent_set_does_not_notify() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1))]).expect("load");
        let probe = joined(&record);

        record.set_with("age", 30, SetOptions::default().silent()).expect("set");
        assert!(probe.log.borrow().is_empty());
        assert!(record.is_dirty());
    }

    #[test]
    fn id_change_notifies_joined() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1))]).expect("load");
        let probe = joined(&record);

        record.set("id", 2).expect("set");
        assert_eq!(record.id(), Key::from("2"));
        assert_eq!(probe.log.borrow()[0], "id:1->2");
    }

    #[test]
    fn unkeyable_id_is_rejected() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1))]).expect("load");
        assert!(matches!(
            record.set_with("id", Value::Null, SetOptions::default().no_convert()),
            Err(RecordError::InvalidId { .. })
        ));
    }

    #[test]
    fn commit_clears_dirty_and_phantom_and_bumps_version() {
        let schema = Schema::builder("doc")
            .field(Field::new("rev", FieldType::Int).default_value(0))
            .field(Field::new("body", FieldType::Text))
            .version_field("rev")
            .build()
            .expect("schema");
        let record = Record::load(schema, [("id".to_string(), Value::Int(1)), ("rev".to_string(), Value::Int(3))])
            .expect("load");
        let probe = joined(&record);

        record.set("body", "hello").expect("set");
        record.commit();

        assert!(!record.is_dirty());
        assert!(!record.is_phantom());
        assert_eq!(record.get("rev"), Some(Value::Int(4)));
        assert_eq!(probe.log.borrow().last().map(String::as_str), Some("commit"));
    }

    #[test]
    fn phantom_commit_does_not_bump_version() {
        let schema = Schema::builder("doc")
            .field(Field::new("rev", FieldType::Int).default_value(0))
            .version_field("rev")
            .build()
            .expect("schema");
        let record = Record::new(schema);
        assert!(record.is_phantom());

        record.commit();
        assert!(!record.is_phantom());
        assert_eq!(record.get("rev"), Some(Value::Int(0)));
    }

    #[test]
    fn dropped_record_erases_on_commit() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1))]).expect("load");
        let probe = joined(&record);

        record.drop_record(false);
        assert!(record.is_dropped());
        assert!(!record.is_erased());

        record.commit();
        assert!(record.is_erased());
        assert_eq!(*probe.log.borrow(), vec!["drop".to_string(), "erase".to_string()]);
    }

    #[test]
    fn phantom_drop_erases_immediately() {
        let record = Record::new(user_schema());
        record.drop_record(true);
        assert!(record.is_erased());
    }

    #[test]
    fn reject_restores_baselines() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1)), ("age".to_string(), Value::Int(30))])
            .expect("load");
        record.set("age", 99).expect("set");

        record.reject().expect("reject");
        assert_eq!(record.get("age"), Some(Value::Int(30)));
        assert!(!record.is_dirty());
    }

    #[test]
    fn reject_on_erased_fails() {
        let record = Record::new(user_schema());
        record.drop_record(true);
        assert!(matches!(record.reject(), Err(RecordError::RejectErased)));
    }

    #[test]
    fn edit_session_cancels_cleanly() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1)), ("age".to_string(), Value::Int(30))])
            .expect("load");
        let probe = joined(&record);

        record.begin_edit();
        record.set("age", 40).expect("set");
        assert!(probe.log.borrow().is_empty(), "edits are quiet inside a session");

        record.cancel_edit();
        assert_eq!(record.get("age"), Some(Value::Int(30)));
        assert!(!record.is_dirty());
    }

    #[test]
    fn end_edit_reports_the_session_diff_once() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1)), ("age".to_string(), Value::Int(30))])
            .expect("load");
        let probe = joined(&record);

        record.begin_edit();
        record.set("age", 40).expect("set");
        record.set("name", "ann").expect("set");
        let names = record.end_edit(false, None).expect("changed");

        assert_eq!(names.len(), 2);
        assert_eq!(probe.log.borrow().len(), 1);
    }

    #[test]
    fn critical_fields_always_report_modified() {
        let schema = Schema::builder("doc")
            .field(Field::new("state", FieldType::Text).critical())
            .build()
            .expect("schema");
        let record = Record::load(schema, [("id".to_string(), Value::Int(1)), ("state".to_string(), Value::from("on"))])
            .expect("load");

        let names = record.set("state", "on").expect("set").expect("critical counts");
        assert_eq!(names, vec!["state".to_string()]);
        assert!(record.is_dirty());
    }

    #[test]
    fn untracked_writes_do_not_dirty() {
        let record = Record::load(user_schema(), [("id".to_string(), Value::Int(1))]).expect("load");
        record.set_with("age", 30, SetOptions::default().untracked()).expect("set");
        assert!(!record.is_dirty());
        assert_eq!(record.get("age"), Some(Value::Int(30)));
    }
}
