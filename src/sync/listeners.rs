//! Subscription lists for synchronized entity events.
//!
//! Callbacks run synchronously inside [`synchronize`](super::synchronize), event by
//! event in ascending entity id, and for each event in registration order. The
//! `last_in_sequence` argument is true on the final event a listener receives in one
//! synchronization, so a listener can accumulate flags and recompute once per batch.

use super::changelog::EventFlags;

/// Callback signature: `(entity id, merged flags, last_in_sequence)`.
pub type Listener = Box<dyn FnMut(u64, EventFlags, bool) + Send>;

/// Handle returned by a subscription; pass it to [`ListenerSet::unsubscribe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Scope {
    All,
    Entity(u64),
}

impl Scope {
    #[inline]
    fn accepts(self, id: u64) -> bool {
        match self {
            Scope::All => true,
            Scope::Entity(e) => e == id,
        }
    }
}

struct Entry {
    id: ListenerId,
    scope: Scope,
    callback: Listener,
}

#[derive(Default)]
pub struct ListenerSet {
    next_id: u64,
    entries: Vec<Entry>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listens to events of every entity.
    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(u64, EventFlags, bool) + Send + 'static,
    {
        self.push(Scope::All, Box::new(callback))
    }

    /// Listens to events of entity `entity` only.
    pub fn subscribe_entity<F>(&mut self, entity: u64, callback: F) -> ListenerId
    where
        F: FnMut(u64, EventFlags, bool) + Send + 'static,
    {
        self.push(Scope::Entity(entity), Box::new(callback))
    }

    /// Removes a listener; false if it was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delivers `events` (sorted by id) to every interested listener.
    pub fn dispatch(&mut self, events: &[(u64, EventFlags)]) {
        let last: Vec<Option<usize>> = self
            .entries
            .iter()
            .map(|e| events.iter().rposition(|&(id, _)| e.scope.accepts(id)))
            .collect();
        for (i, &(id, flags)) in events.iter().enumerate() {
            for (entry, last) in self.entries.iter_mut().zip(&last) {
                if entry.scope.accepts(id) {
                    (entry.callback)(id, flags, *last == Some(i));
                }
            }
        }
    }

    fn push(&mut self, scope: Scope, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            scope,
            callback,
        });
        id
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.entries.len())
            .finish()
    }
}
