use crate::event::scheduler::{Scheduler, TaskId};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

///
/// EventPayload
///
/// Event vocabulary carried through a hub. Payloads must be cloneable so
/// suspended queues and buffered listeners can hold them; entity payloads
/// are shared handles, so cloning is pointer-cheap.
///

pub trait EventPayload: Clone + 'static {
    /// Canonical event name for this payload.
    fn event_name(&self) -> &'static str;
}

///
/// Control
///
/// Handler verdict. `Stop` halts remaining handlers and any bubbling for the
/// current fire and makes the fire report `false`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Control {
    Continue,
    Stop,
}

///
/// ListenerOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ListenerOptions {
    /// Higher priority runs first; ties break by registration order.
    pub priority: i32,
    /// Remove the listener after its first invocation.
    pub single: bool,
    /// Defer each invocation by this many milliseconds (requires a scheduler).
    pub delay: Option<u64>,
    /// Debounce: a later fire within the window supersedes the scheduled one.
    pub buffer: Option<u64>,
}

impl ListenerOptions {
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    #[must_use]
    pub fn delay(mut self, ms: u64) -> Self {
        self.delay = Some(ms);
        self
    }

    #[must_use]
    pub fn buffer(mut self, ms: u64) -> Self {
        self.buffer = Some(ms);
        self
    }
}

///
/// ListenerToken
///
/// Disposable registration handle. Dropping the token does not remove the
/// listener; call `dispose`.
///

pub struct ListenerToken {
    dispose: Box<dyn FnOnce()>,
}

impl ListenerToken {
    /// Remove the listener this token was returned for.
    pub fn dispose(self) {
        (self.dispose)();
    }
}

///
/// RelayToken
///
/// Removes every forwarding listener a `relay` call created.
///

pub struct RelayToken {
    tokens: Vec<ListenerToken>,
}

impl RelayToken {
    pub fn dispose(self) {
        for token in self.tokens {
            token.dispose();
        }
    }
}

type Handler<E> = Rc<dyn Fn(&E) -> Control>;

struct Listener<E> {
    id: u64,
    seq: u64,
    priority: i32,
    single: bool,
    delay: Option<u64>,
    buffer: Option<u64>,
    handler: Handler<E>,
    /// Pending buffered task, superseded by later fires within the window.
    pending: Cell<Option<TaskId>>,
}

struct BubbleLink<E: EventPayload> {
    parent: Weak<EventHub<E>>,
    events: HashSet<String>,
}

struct HubInner<E: EventPayload> {
    /// Per-event listener lists, kept sorted by (priority desc, seq asc).
    events: HashMap<String, Vec<Rc<Listener<E>>>>,
    /// Reference-counted listener presence, consulted before any dispatch
    /// work. Bubble registration counts once per bubbled event name so a
    /// bubbled fire is never skipped.
    presence: HashMap<String, usize>,
    suspended: u32,
    queue: Option<Vec<(String, E)>>,
    bubble: Option<BubbleLink<E>>,
    scheduler: Option<Rc<dyn Scheduler>>,
    next_seq: u64,
}

///
/// EventHub
///
/// Per-instance publish/subscribe hub with priority-ordered dispatch,
/// counted suspension, and bubbling to one explicit parent hub. Owned
/// behind `Rc` by the entity that fires through it.
///

pub struct EventHub<E: EventPayload> {
    inner: RefCell<HubInner<E>>,
}

impl<E: EventPayload> Default for EventHub<E> {
    fn default() -> Self {
        Self {
            inner: RefCell::new(HubInner {
                events: HashMap::new(),
                presence: HashMap::new(),
                suspended: 0,
                queue: None,
                bubble: None,
                scheduler: None,
                next_seq: 0,
            }),
        }
    }
}

impl<E: EventPayload> EventHub<E> {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Install the timing source used by `delay`/`buffer` listeners.
    pub fn set_scheduler(&self, scheduler: Rc<dyn Scheduler>) {
        self.inner.borrow_mut().scheduler = Some(scheduler);
    }

    /// Returns `true` if anyone (listener or bubble registration) would
    /// observe `name` firing.
    #[must_use]
    pub fn has_listeners(&self, name: &str) -> bool {
        self.inner
            .borrow()
            .presence
            .get(name)
            .is_some_and(|count| *count > 0)
    }

    /// Register a handler for `name`. See [`ListenerOptions`].
    pub fn on(
        self: &Rc<Self>,
        name: &str,
        handler: impl Fn(&E) -> Control + 'static,
        options: ListenerOptions,
    ) -> ListenerToken {
        self.register(name, Rc::new(handler), options)
            .expect("fresh handler cannot be a duplicate")
    }

    /// Register a shared handler. Re-registering the same `Rc` for the same
    /// event is a no-op and returns `None`.
    pub fn on_shared(
        self: &Rc<Self>,
        name: &str,
        handler: Handler<E>,
        options: ListenerOptions,
    ) -> Option<ListenerToken> {
        self.register(name, handler, options)
    }

    fn register(
        self: &Rc<Self>,
        name: &str,
        handler: Handler<E>,
        options: ListenerOptions,
    ) -> Option<ListenerToken> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let list = inner.events.entry(name.to_string()).or_default();
            if list
                .iter()
                .any(|existing| Rc::ptr_eq(&existing.handler, &handler))
            {
                return None;
            }

            inner.next_seq += 1;
            let seq = inner.next_seq;
            let listener = Rc::new(Listener {
                id: seq,
                seq,
                priority: options.priority,
                single: options.single,
                delay: options.delay,
                buffer: options.buffer,
                handler,
                pending: Cell::new(None),
            });

            // Re-borrow the list; the entry above may have moved.
            let list = inner.events.entry(name.to_string()).or_default();
            let at = list
                .partition_point(|other| (other.priority, u64::MAX - other.seq) >= (listener.priority, u64::MAX - listener.seq));
            list.insert(at, listener);
            *inner.presence.entry(name.to_string()).or_insert(0) += 1;
            seq
        };

        let hub = Rc::downgrade(self);
        let event = name.to_string();
        Some(ListenerToken {
            dispose: Box::new(move || {
                if let Some(hub) = hub.upgrade() {
                    hub.remove_listener(&event, id);
                }
            }),
        })
    }

    fn remove_listener(&self, name: &str, id: u64) {
        let mut inner = self.inner.borrow_mut();
        let Some(list) = inner.events.get_mut(name) else {
            return;
        };
        let before = list.len();
        list.retain(|listener| listener.id != id);
        if list.len() < before
            && let Some(count) = inner.presence.get_mut(name)
        {
            *count -= 1;
        }
    }

    /// Fire a payload under its canonical event name.
    pub fn fire(self: &Rc<Self>, payload: E) -> bool {
        let name = payload.event_name();
        self.fire_as(name, payload)
    }

    /// Fire a payload under an explicit name (used by relays).
    ///
    /// Returns `false` if any handler stopped the dispatch.
    pub fn fire_as(self: &Rc<Self>, name: &str, payload: E) -> bool {
        let mut target = Rc::clone(self);

        loop {
            if !target.has_listeners(name) {
                // Nothing at this level; bubbling presence would have been
                // counted here, so we are done.
                return true;
            }

            {
                let mut inner = target.inner.borrow_mut();
                if inner.suspended > 0 {
                    if let Some(queue) = inner.queue.as_mut() {
                        queue.push((name.to_string(), payload));
                    }
                    return true;
                }
            }

            if !target.dispatch(name, &payload) {
                return false;
            }

            let parent = {
                let inner = target.inner.borrow();
                inner.bubble.as_ref().and_then(|link| {
                    link.events
                        .contains(name)
                        .then(|| link.parent.upgrade())
                        .flatten()
                })
            };

            match parent {
                Some(parent) => target = parent,
                None => return true,
            }
        }
    }

    /// Run handlers at this level over a stable snapshot.
    fn dispatch(self: &Rc<Self>, name: &str, payload: &E) -> bool {
        let snapshot: Vec<Rc<Listener<E>>> = self
            .inner
            .borrow()
            .events
            .get(name)
            .cloned()
            .unwrap_or_default();

        for listener in snapshot {
            if let Some(window) = listener.buffer {
                self.schedule_buffered(name, &listener, payload.clone(), window);
                continue;
            }
            if let Some(wait) = listener.delay {
                self.schedule_delayed(name, &listener, payload.clone(), wait);
                continue;
            }

            let verdict = (listener.handler)(payload);
            if listener.single {
                self.remove_listener(name, listener.id);
            }
            if verdict == Control::Stop {
                return false;
            }
        }

        true
    }

    fn schedule_delayed(self: &Rc<Self>, name: &str, listener: &Rc<Listener<E>>, payload: E, wait: u64) {
        let Some(scheduler) = self.inner.borrow().scheduler.clone() else {
            return;
        };

        let hub = Rc::downgrade(self);
        let event = name.to_string();
        let listener = Rc::clone(listener);
        scheduler.schedule(
            wait,
            Box::new(move || {
                (listener.handler)(&payload);
                if listener.single
                    && let Some(hub) = hub.upgrade()
                {
                    hub.remove_listener(&event, listener.id);
                }
            }),
        );
    }

    fn schedule_buffered(self: &Rc<Self>, name: &str, listener: &Rc<Listener<E>>, payload: E, window: u64) {
        let Some(scheduler) = self.inner.borrow().scheduler.clone() else {
            return;
        };

        if let Some(pending) = listener.pending.take() {
            scheduler.cancel(pending);
        }

        let hub = Rc::downgrade(self);
        let event = name.to_string();
        let task_listener = Rc::clone(listener);
        let task = scheduler.schedule(
            window,
            Box::new(move || {
                task_listener.pending.set(None);
                (task_listener.handler)(&payload);
                if task_listener.single
                    && let Some(hub) = hub.upgrade()
                {
                    hub.remove_listener(&event, task_listener.id);
                }
            }),
        );
        listener.pending.set(Some(task));
    }

    /// Suspend event delivery. With `queue`, fires while suspended are kept
    /// and replayed FIFO on the final `resume`.
    pub fn suspend(&self, queue: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.suspended += 1;
        if queue && inner.queue.is_none() {
            inner.queue = Some(Vec::new());
        }
    }

    /// Decrement the suspend count; at zero, replay (or discard) the queue.
    pub fn resume(self: &Rc<Self>, discard: bool) {
        let replay = {
            let mut inner = self.inner.borrow_mut();
            if inner.suspended == 0 {
                return;
            }
            inner.suspended -= 1;
            if inner.suspended > 0 {
                None
            } else {
                // The queue belongs to this suspension; a later suspension
                // only queues if it asks to.
                inner.queue.take()
            }
        };

        if let Some(queued) = replay
            && !discard
        {
            for (name, payload) in queued {
                self.fire_as(&name, payload);
            }
        }
    }

    /// Returns `true` while delivery is suspended.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.inner.borrow().suspended > 0
    }

    /// Point this hub at a bubble parent for the named events.
    ///
    /// Each name gains one presence count on this hub so firing is never
    /// skipped even with no direct listeners.
    pub fn set_bubble_parent(&self, parent: &Rc<Self>, events: &[&str]) {
        let mut inner = self.inner.borrow_mut();
        let mut names = match inner.bubble.take() {
            Some(existing) => existing.events,
            None => HashSet::new(),
        };
        // Names already bubbling hold their presence count.
        for name in events {
            if names.insert((*name).to_string()) {
                *inner.presence.entry((*name).to_string()).or_insert(0) += 1;
            }
        }
        inner.bubble = Some(BubbleLink {
            parent: Rc::downgrade(parent),
            events: names,
        });
    }

    /// Forward the named events from `source` onto this hub, optionally
    /// renamed with `prefix`.
    pub fn relay(self: &Rc<Self>, source: &Rc<Self>, events: &[&str], prefix: Option<&str>) -> RelayToken {
        let mut tokens = Vec::with_capacity(events.len());

        for name in events {
            let target = Rc::downgrade(self);
            let fired = prefix.map_or_else(|| (*name).to_string(), |prefix| format!("{prefix}{name}"));
            let token = source.on(
                name,
                move |payload: &E| {
                    if let Some(target) = target.upgrade() {
                        target.fire_as(&fired, payload.clone());
                    }
                    Control::Continue
                },
                ListenerOptions::default(),
            );
            tokens.push(token);
        }

        RelayToken { tokens }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ManualScheduler;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping(&'static str, i64);

    impl EventPayload for Ping {
        fn event_name(&self) -> &'static str {
            self.0
        }
    }

    fn log_handler(log: &Rc<RefCell<Vec<i64>>>, tag: i64) -> impl Fn(&Ping) -> Control + use<> {
        let log = Rc::clone(log);
        move |_| {
            log.borrow_mut().push(tag);
            Control::Continue
        }
    }

    #[test]
    fn handlers_run_in_priority_order_with_ties_by_registration() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        hub.on("ping", log_handler(&log, 1), ListenerOptions::default());
        hub.on("ping", log_handler(&log, 2), ListenerOptions::default().priority(10));
        hub.on("ping", log_handler(&log, 3), ListenerOptions::default());
        hub.on("ping", log_handler(&log, 4), ListenerOptions::default().priority(10));

        assert!(hub.fire(Ping("ping", 0)));
        assert_eq!(*log.borrow(), vec![2, 4, 1, 3]);
    }

    #[test]
    fn stop_halts_remaining_handlers() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        hub.on("ping", |_| Control::Stop, ListenerOptions::default().priority(1));
        hub.on("ping", log_handler(&log, 1), ListenerOptions::default());

        assert!(!hub.fire(Ping("ping", 0)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn single_listeners_self_remove() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        hub.on("ping", log_handler(&log, 1), ListenerOptions::default().single());

        hub.fire(Ping("ping", 0));
        hub.fire(Ping("ping", 0));

        assert_eq!(*log.borrow(), vec![1]);
        assert!(!hub.has_listeners("ping"));
    }

    #[test]
    fn duplicate_shared_handlers_are_rejected() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let handler: Rc<dyn Fn(&Ping) -> Control> = Rc::new(log_handler(&log, 1));

        assert!(hub.on_shared("ping", Rc::clone(&handler), ListenerOptions::default()).is_some());
        assert!(hub.on_shared("ping", handler, ListenerOptions::default()).is_none());

        hub.fire(Ping("ping", 0));
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn suspend_with_queue_replays_in_order_with_original_args() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            hub.on(
                "ping",
                move |payload: &Ping| {
                    log.borrow_mut().push(payload.1);
                    Control::Continue
                },
                ListenerOptions::default(),
            );
        }

        hub.suspend(true);
        hub.fire(Ping("ping", 7));
        hub.fire(Ping("ping", 8));
        assert!(log.borrow().is_empty());

        hub.resume(false);
        assert_eq!(*log.borrow(), vec![7, 8]);

        // Replay happens exactly once.
        hub.suspend(true);
        hub.resume(false);
        assert_eq!(*log.borrow(), vec![7, 8]);
    }

    #[test]
    fn queueing_does_not_outlive_its_suspension() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            hub.on(
                "ping",
                move |payload: &Ping| {
                    log.borrow_mut().push(payload.1);
                    Control::Continue
                },
                ListenerOptions::default(),
            );
        }

        hub.suspend(true);
        hub.fire(Ping("ping", 1));
        hub.resume(false);
        assert_eq!(*log.borrow(), vec![1]);

        // A later unqueued suspension drops its events.
        hub.suspend(false);
        hub.fire(Ping("ping", 2));
        hub.resume(false);
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn suspend_without_queue_drops_events() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        hub.on("ping", log_handler(&log, 1), ListenerOptions::default());

        hub.suspend(false);
        hub.fire(Ping("ping", 0));
        hub.resume(false);

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn resume_discard_drops_the_queue() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        hub.on("ping", log_handler(&log, 1), ListenerOptions::default());

        hub.suspend(true);
        hub.fire(Ping("ping", 0));
        hub.resume(true);

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn bubbling_reaches_the_parent_until_stopped() {
        let parent = EventHub::<Ping>::new();
        let child = EventHub::<Ping>::new();
        child.set_bubble_parent(&parent, &["ping"]);

        let log = Rc::new(RefCell::new(Vec::new()));
        parent.on("ping", log_handler(&log, 10), ListenerOptions::default());

        // No direct listeners on the child; the bubble registration keeps
        // presence alive so the fire is not skipped.
        assert!(child.fire(Ping("ping", 0)));
        assert_eq!(*log.borrow(), vec![10]);

        child.on("ping", |_| Control::Stop, ListenerOptions::default());
        assert!(!child.fire(Ping("ping", 0)));
        assert_eq!(*log.borrow(), vec![10]);
    }

    #[test]
    fn repointing_the_bubble_parent_counts_each_name_once() {
        let parent = EventHub::<Ping>::new();
        let child = EventHub::<Ping>::new();

        child.set_bubble_parent(&parent, &["ping"]);
        child.set_bubble_parent(&parent, &["ping", "pong"]);

        let inner = child.inner.borrow();
        assert_eq!(inner.presence.get("ping").copied(), Some(1));
        assert_eq!(inner.presence.get("pong").copied(), Some(1));
    }

    #[test]
    fn relay_forwards_with_prefix_and_disposes() {
        let source = EventHub::<Ping>::new();
        let target = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        target.on("sourceping", log_handler(&log, 1), ListenerOptions::default());

        let relay = target.relay(&source, &["ping"], Some("source"));
        source.fire(Ping("ping", 0));
        assert_eq!(*log.borrow(), vec![1]);

        relay.dispose();
        source.fire(Ping("ping", 0));
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn buffered_listener_keeps_only_the_latest_call() {
        let hub = EventHub::<Ping>::new();
        let scheduler = Rc::new(ManualScheduler::new());
        hub.set_scheduler(Rc::clone(&scheduler) as Rc<dyn Scheduler>);

        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            hub.on(
                "ping",
                move |payload: &Ping| {
                    log.borrow_mut().push(payload.1);
                    Control::Continue
                },
                ListenerOptions::default().buffer(50),
            );
        }

        hub.fire(Ping("ping", 1));
        scheduler.advance(20);
        hub.fire(Ping("ping", 2));
        scheduler.advance(60);

        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn delayed_listener_runs_after_the_wait() {
        let hub = EventHub::<Ping>::new();
        let scheduler = Rc::new(ManualScheduler::new());
        hub.set_scheduler(Rc::clone(&scheduler) as Rc<dyn Scheduler>);

        let log = Rc::new(RefCell::new(Vec::new()));
        hub.on("ping", log_handler(&log, 1), ListenerOptions::default().delay(25));

        hub.fire(Ping("ping", 0));
        assert!(log.borrow().is_empty());
        scheduler.advance(25);
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn listener_token_dispose_removes_and_updates_presence() {
        let hub = EventHub::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let token = hub.on("ping", log_handler(&log, 1), ListenerOptions::default());

        assert!(hub.has_listeners("ping"));
        token.dispose();
        assert!(!hub.has_listeners("ping"));
    }
}
