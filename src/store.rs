//! In-memory mirror of every fragment the source currently knows about.
//!
//! The source is the only writer; generation is the only reader. Every
//! mutation is a single replace-or-snapshot step under the map lock, so
//! [`FragmentStore::list`] never observes a half-applied entry. Subscribers are
//! called after the lock is released.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;

use crate::fragment::{Fragment, FragmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Added => "add",
            ChangeKind::Updated => "update",
            ChangeKind::Deleted => "delete",
        };
        f.write_str(s)
    }
}

/// A change delivered to subscribers.
///
/// For deletes `fragment` is the last known snapshot. `previous` is only set
/// for updates.
#[derive(Debug, Clone, Copy)]
pub struct FragmentEvent<'a> {
    pub kind: ChangeKind,
    pub fragment: &'a Fragment,
    pub previous: Option<&'a Fragment>,
}

impl FragmentEvent<'_> {
    /// Whether this change can alter generated output: the fragment is
    /// eligible now, or was before the update.
    pub fn affects_output(&self, annotation: &str) -> bool {
        self.fragment.is_eligible(annotation)
            || self.previous.is_some_and(|p| p.is_eligible(annotation))
    }
}

type Subscriber = Box<dyn Fn(&FragmentEvent<'_>) + Send + Sync>;

enum Change {
    Added(Fragment),
    Updated { previous: Fragment, current: Fragment },
    Deleted(Fragment),
}

impl Change {
    fn event(&self) -> FragmentEvent<'_> {
        match self {
            Change::Added(fragment) => FragmentEvent {
                kind: ChangeKind::Added,
                fragment,
                previous: None,
            },
            Change::Updated { previous, current } => FragmentEvent {
                kind: ChangeKind::Updated,
                fragment: current,
                previous: Some(previous),
            },
            Change::Deleted(fragment) => FragmentEvent {
                kind: ChangeKind::Deleted,
                fragment,
                previous: None,
            },
        }
    }
}

#[derive(Default)]
pub struct FragmentStore {
    fragments: RwLock<BTreeMap<FragmentId, Fragment>>,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every add, update and delete.
    ///
    /// Callbacks run on the writer's task and must not call back into
    /// [`FragmentStore::subscribe`].
    pub fn subscribe(&self, callback: impl Fn(&FragmentEvent<'_>) + Send + Sync + 'static) {
        self.subscribers.write().push(Box::new(callback));
    }

    /// Snapshot of all fragments, sorted by identity.
    pub fn list(&self) -> Vec<Fragment> {
        self.fragments.read().values().cloned().collect()
    }

    pub fn get(&self, id: &FragmentId) -> Option<Fragment> {
        self.fragments.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.fragments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.read().is_empty()
    }

    /// Add or update a fragment. Returns the change made, or `None` when the
    /// stored snapshot was already identical.
    pub fn apply(&self, fragment: Fragment) -> Option<ChangeKind> {
        let change = {
            let mut fragments = self.fragments.write();
            match fragments.insert(fragment.id.clone(), fragment.clone()) {
                None => Change::Added(fragment),
                Some(previous) if previous == fragment => return None,
                Some(previous) => Change::Updated {
                    previous,
                    current: fragment,
                },
            }
        };
        Some(self.dispatch(&change))
    }

    /// Remove a fragment. Returns whether it was known.
    pub fn delete(&self, id: &FragmentId) -> bool {
        let removed = self.fragments.write().remove(id);
        match removed {
            Some(fragment) => {
                self.dispatch(&Change::Deleted(fragment));
                true
            }
            None => false,
        }
    }

    /// Replace the whole mirror with a fresh listing.
    ///
    /// Emits a delete for every fragment missing from `fragments`, and an add
    /// or update for every new or changed one. Returns the number of changes.
    pub fn replace(&self, fragments: impl IntoIterator<Item = Fragment>) -> usize {
        let incoming: BTreeMap<FragmentId, Fragment> = fragments
            .into_iter()
            .map(|fragment| (fragment.id.clone(), fragment))
            .collect();

        let mut previous = {
            let mut current = self.fragments.write();
            std::mem::replace(&mut *current, incoming.clone())
        };

        let mut changes = Vec::new();
        for (id, fragment) in incoming {
            match previous.remove(&id) {
                None => changes.push(Change::Added(fragment)),
                Some(old) if old == fragment => {}
                Some(old) => changes.push(Change::Updated {
                    previous: old,
                    current: fragment,
                }),
            }
        }
        changes.extend(previous.into_values().map(Change::Deleted));

        for change in &changes {
            self.dispatch(change);
        }
        changes.len()
    }

    fn dispatch(&self, change: &Change) -> ChangeKind {
        let event = change.event();
        for subscriber in self.subscribers.read().iter() {
            subscriber(&event);
        }
        event.kind
    }
}

impl fmt::Debug for FragmentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentStore")
            .field("fragments", &self.len())
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const KEY: &str = "prometheus.io/config";

    fn fragment(ns: &str, name: &str) -> Fragment {
        Fragment::new(FragmentId::new(ns, name))
    }

    fn recording_store() -> (FragmentStore, Arc<Mutex<Vec<(ChangeKind, String)>>>) {
        let store = FragmentStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |event| {
            sink.lock()
                .unwrap()
                .push((event.kind, event.fragment.id.to_string()));
        });
        (store, seen)
    }

    #[test]
    fn test_apply_add_update_delete() {
        let (store, seen) = recording_store();

        assert_eq!(store.apply(fragment("ns", "a")), Some(ChangeKind::Added));
        assert_eq!(
            store.apply(fragment("ns", "a").with_data("x.rules", "groups: []")),
            Some(ChangeKind::Updated)
        );
        assert!(store.delete(&FragmentId::new("ns", "a")));
        assert!(!store.delete(&FragmentId::new("ns", "a")));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ChangeKind::Added, "ns/a".to_string()),
                (ChangeKind::Updated, "ns/a".to_string()),
                (ChangeKind::Deleted, "ns/a".to_string()),
            ]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_identical_apply_is_silent() {
        let (store, seen) = recording_store();
        let f = fragment("ns", "a").with_annotation(KEY, "true");

        store.apply(f.clone());
        assert_eq!(store.apply(f), None);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_list_is_sorted_snapshot() {
        let store = FragmentStore::new();
        store.apply(fragment("zeta", "a"));
        store.apply(fragment("alpha", "b"));
        store.apply(fragment("alpha", "a"));

        let ids: Vec<_> = store.list().into_iter().map(|f| f.id.to_string()).collect();
        assert_eq!(ids, vec!["alpha/a", "alpha/b", "zeta/a"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_replace_diffs_against_mirror() {
        let (store, seen) = recording_store();
        store.apply(fragment("ns", "kept"));
        store.apply(fragment("ns", "changed"));
        store.apply(fragment("ns", "gone"));
        seen.lock().unwrap().clear();

        let changes = store.replace(vec![
            fragment("ns", "kept"),
            fragment("ns", "changed").with_data("a.rules", "x"),
            fragment("ns", "new"),
        ]);

        assert_eq!(changes, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ChangeKind::Updated, "ns/changed".to_string()),
                (ChangeKind::Added, "ns/new".to_string()),
                (ChangeKind::Deleted, "ns/gone".to_string()),
            ]
        );
        assert!(store.get(&FragmentId::new("ns", "gone")).is_none());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_affects_output_sees_previous_eligibility() {
        let store = FragmentStore::new();
        let relevant = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&relevant);
        store.subscribe(move |event| sink.lock().unwrap().push(event.affects_output(KEY)));

        store.apply(fragment("ns", "a"));
        store.apply(fragment("ns", "a").with_annotation(KEY, "true"));
        store.apply(fragment("ns", "a").with_annotation(KEY, "false"));
        store.apply(fragment("ns", "a").with_annotation(KEY, "no"));
        store.delete(&FragmentId::new("ns", "a"));

        assert_eq!(*relevant.lock().unwrap(), vec![false, true, true, false, false]);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(FragmentStore::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.apply(
                            fragment("ns", &format!("w{w}-{i}")).with_data("a.rules", "groups: []"),
                        );
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            for f in store.list() {
                assert_eq!(f.data["a.rules"], "groups: []");
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
