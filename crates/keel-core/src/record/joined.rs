use crate::key::Key;
use crate::record::Record;

///
/// JoinedObserver
///
/// Lifecycle channel for parties a record is joined to, typically the
/// collections holding it. Separate from the event hub: joined parties are
/// structural owners, not subscribers, and are held weakly so dropping a
/// collection silently unjoins it.
///

pub trait JoinedObserver {
    /// Fields changed outside an edit session, or an edit session ended.
    fn after_edit(&self, record: &Record, modified: &[String]) {
        let _ = (record, modified);
    }

    fn after_commit(&self, record: &Record) {
        let _ = record;
    }

    fn after_reject(&self, record: &Record) {
        let _ = record;
    }

    fn after_drop(&self, record: &Record) {
        let _ = record;
    }

    /// The record was committed while dropped and is now erased.
    fn after_erase(&self, record: &Record) {
        let _ = record;
    }

    /// The identity field changed; keyed holders must re-map the record.
    fn id_changed(&self, record: &Record, old: &Key, new: &Key) {
        let _ = (record, old, new);
    }
}
