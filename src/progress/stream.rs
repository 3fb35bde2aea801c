// file: src/progress/stream.rs
// description: multi-emission cancelable stream with per-emission cleanup
// reference: explicit Active/Finished/Errored state machine over an ordered subscriber table

use super::listeners::{Cleanup, HookId, Listeners, Subscription, SubscriptionId, SubscriptionTarget};
use super::scheduler::{Immediate, Scheduler};
use crate::error::ProgressError;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Active,
    Finished,
    Errored,
}

impl ProgressState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProgressState::Active)
    }
}

struct Subscriber<T, E> {
    listeners: Listeners<T, E>,
    emit_cleanup: Option<Cleanup>,
    hooks: Vec<(HookId, Cleanup)>,
}

pub(crate) struct Inner<T, E> {
    state: ProgressState,
    last_result: Option<Rc<T>>,
    error: Option<Rc<E>>,
    iteration: u64,
    next_subscription: u64,
    next_hook: u64,
    // BTreeMap keyed by increasing ids: iteration order is registration order.
    subscribers: BTreeMap<SubscriptionId, Subscriber<T, E>>,
    teardown: Option<Cleanup>,
    producer_ran: bool,
    stopped: bool,
    // Set while an emission is being delivered; nested emits wait in `queued`.
    delivering: bool,
    queued: VecDeque<T>,
}

impl<T, E> Inner<T, E> {
    fn new() -> Self {
        Self {
            state: ProgressState::Active,
            last_result: None,
            error: None,
            iteration: 0,
            next_subscription: 0,
            next_hook: 0,
            subscribers: BTreeMap::new(),
            teardown: None,
            producer_ran: false,
            stopped: false,
            delivering: false,
            queued: VecDeque::new(),
        }
    }

    fn ensure_active(&self, operation: &'static str) -> Result<(), ProgressError> {
        if self.state.is_terminal() {
            return Err(ProgressError::AlreadyFinished { operation });
        }
        Ok(())
    }
}

type Shared<T, E> = RefCell<Inner<T, E>>;

enum Registration<T, E> {
    Live(SubscriptionId),
    Replay {
        listeners: Listeners<T, E>,
        error: Option<Rc<E>>,
        last_result: Option<Rc<T>>,
        iteration: u64,
    },
}

/// A multi-shot asynchronous value.
///
/// A producer drives the stream through an [`Emitter`]: any number of
/// emissions, then at most one of `finish` or `reject`. Subscribers receive
/// every emission together with its zero-based iteration. An `on_emit`
/// callback may return a cleanup that runs before the next emission reaches
/// the same subscriber, or when it unsubscribes.
///
/// `Progress` is a cheap handle: clones share the same stream. It is
/// single-threaded (`!Send`); all callbacks run to completion on the calling
/// thread.
///
/// # Scheduling
///
/// [`Progress::new`] runs the producer synchronously before returning.
/// [`Progress::with_scheduler`] posts the producer to the given
/// [`Scheduler`] instead. `stop()` is always posted to the same scheduler, so
/// with a FIFO scheduler the producer's teardown is bound before it fires.
pub struct Progress<T, E> {
    pub(crate) shared: Rc<Shared<T, E>>,
    pub(crate) scheduler: Rc<dyn Scheduler>,
}

impl<T, E> Clone for Progress<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            scheduler: Rc::clone(&self.scheduler),
        }
    }
}

impl<T, E> fmt::Debug for Progress<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.borrow();
        f.debug_struct("Progress")
            .field("state", &inner.state)
            .field("iteration", &inner.iteration)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

/// Producer-side capabilities of a [`Progress`].
///
/// Every method fails with [`ProgressError::AlreadyFinished`] once the stream
/// is terminal.
pub struct Emitter<T, E> {
    shared: Rc<Shared<T, E>>,
}

impl<T, E> Clone for Emitter<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for Emitter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("state", &self.shared.borrow().state)
            .finish()
    }
}

impl<T: 'static, E: 'static> Emitter<T, E> {
    pub fn emit(&self, value: T) -> Result<(), ProgressError> {
        emit(&self.shared, value)
    }

    pub fn reject(&self, error: E) -> Result<(), ProgressError> {
        reject(&self.shared, error)
    }

    pub fn finish(&self) -> Result<(), ProgressError> {
        finish(&self.shared)
    }

    pub fn is_active(&self) -> bool {
        !self.shared.borrow().state.is_terminal()
    }
}

impl<T: 'static, E: 'static> Progress<T, E> {
    pub fn new(producer: impl FnOnce(Emitter<T, E>) -> Option<Cleanup> + 'static) -> Self {
        Self::with_scheduler(Rc::new(Immediate), producer)
    }

    pub fn with_scheduler(
        scheduler: Rc<dyn Scheduler>,
        producer: impl FnOnce(Emitter<T, E>) -> Option<Cleanup> + 'static,
    ) -> Self {
        let progress = Self {
            shared: Rc::new(RefCell::new(Inner::new())),
            scheduler,
        };
        let shared = Rc::clone(&progress.shared);
        progress
            .scheduler
            .schedule(Box::new(move || run_producer(&shared, producer)));
        progress
    }

    /// A progress that emits `value` once and finishes.
    pub fn ready(value: T) -> Self {
        Self::new(move |emitter| {
            let _ = emitter.emit(value).and_then(|_| emitter.finish());
            None
        })
    }

    /// A progress that is rejected with `error` right away.
    pub fn failed(error: E) -> Self {
        Self::new(move |emitter| {
            let _ = emitter.reject(error);
            None
        })
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.scheduler)
    }

    pub fn state(&self) -> ProgressState {
        self.shared.borrow().state
    }

    pub fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn iteration(&self) -> u64 {
        self.shared.borrow().iteration
    }

    pub fn last_result(&self) -> Option<Rc<T>> {
        self.shared.borrow().last_result.clone()
    }

    pub fn error(&self) -> Option<Rc<E>> {
        self.shared.borrow().error.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.borrow().subscribers.len()
    }

    /// Attaches `listeners`.
    ///
    /// On a terminal stream the outcome is replayed synchronously and the
    /// returned handle is detached: `on_error` if it errored, otherwise
    /// `on_emit(last_result, iteration)`, or `on_finish` when it finished
    /// without ever emitting. Every call creates an independent subscription.
    pub fn subscribe(&self, listeners: Listeners<T, E>) -> Subscription {
        let replay = {
            let mut inner = self.shared.borrow_mut();
            match inner.state {
                ProgressState::Active => {
                    let id = SubscriptionId(inner.next_subscription);
                    inner.next_subscription += 1;
                    inner.subscribers.insert(
                        id,
                        Subscriber {
                            listeners,
                            emit_cleanup: None,
                            hooks: Vec::new(),
                        },
                    );
                    trace!("Registered subscriber {}", id);
                    Registration::Live(id)
                }
                ProgressState::Errored => Registration::Replay {
                    listeners,
                    error: inner.error.clone(),
                    last_result: None,
                    iteration: 0,
                },
                ProgressState::Finished => Registration::Replay {
                    listeners,
                    error: None,
                    last_result: inner.last_result.clone(),
                    iteration: inner.iteration,
                },
            }
        };

        let (listeners, error, last_result, iteration) = match replay {
            Registration::Live(id) => {
                let target: Rc<dyn SubscriptionTarget> = self.shared.clone();
                return Subscription::attached(target, id);
            }
            Registration::Replay {
                listeners,
                error,
                last_result,
                iteration,
            } => (listeners, error, last_result, iteration),
        };

        trace!("Replaying terminal outcome to a late subscriber");
        match (error, last_result) {
            (Some(error), _) => {
                if let Some(on_error) = listeners.on_error {
                    on_error(&error);
                }
            }
            (None, Some(value)) => {
                if let Some(mut on_emit) = listeners.on_emit {
                    // Nothing will ever follow the replay, so its cleanup runs now.
                    if let Some(cleanup) = on_emit(&value, iteration) {
                        cleanup();
                    }
                }
            }
            (None, None) => {
                if let Some(on_finish) = listeners.on_finish {
                    on_finish();
                }
            }
        }
        Subscription::detached()
    }

    /// Halts the producer: runs its teardown (once), finishes the stream if
    /// it is still active and drops all subscriber bookkeeping. Posted to the
    /// progress' scheduler.
    pub fn stop(&self) {
        let shared = Rc::clone(&self.shared);
        self.scheduler.schedule(Box::new(move || stop_now(&shared)));
    }
}

fn run_producer<T: 'static, E: 'static>(
    shared: &Rc<Shared<T, E>>,
    producer: impl FnOnce(Emitter<T, E>) -> Option<Cleanup>,
) {
    if shared.borrow().stopped {
        debug!("Progress stopped before its producer ran; producer skipped");
        return;
    }

    let teardown = producer(Emitter {
        shared: Rc::clone(shared),
    });

    let late_teardown = {
        let mut inner = shared.borrow_mut();
        inner.producer_ran = true;
        if inner.stopped {
            teardown
        } else {
            inner.teardown = teardown;
            None
        }
    };
    // stop() ran while the producer was still executing.
    if let Some(teardown) = late_teardown {
        teardown();
    }
}

/// Emits `value`, or queues it when called from inside a delivery of the
/// same stream. Queued values are delivered in order once the current one has
/// reached every subscriber, and are dropped if the stream turns terminal
/// first.
fn emit<T: 'static, E: 'static>(shared: &Shared<T, E>, value: T) -> Result<(), ProgressError> {
    {
        let mut inner = shared.borrow_mut();
        inner.ensure_active("emit")?;
        if inner.delivering {
            trace!("Queueing re-entrant emission after iteration {}", inner.iteration);
            inner.queued.push_back(value);
            return Ok(());
        }
        inner.delivering = true;
    }

    let mut next = Some(value);
    while let Some(value) = next {
        deliver(shared, value);

        let dropped = {
            let mut inner = shared.borrow_mut();
            if inner.state.is_terminal() {
                next = None;
                std::mem::take(&mut inner.queued)
            } else {
                next = inner.queued.pop_front();
                VecDeque::new()
            }
        };
        if !dropped.is_empty() {
            trace!("Dropped {} queued emissions after the stream closed", dropped.len());
        }
        drop(dropped);
    }
    shared.borrow_mut().delivering = false;
    Ok(())
}

fn deliver<T: 'static, E: 'static>(shared: &Shared<T, E>, value: T) {
    // The value counts as emitted before any subscriber sees it, so a
    // subscriber that finishes the stream mid-delivery leaves it replayable.
    let (ids, iteration, value) = {
        let mut inner = shared.borrow_mut();
        let value = Rc::new(value);
        let iteration = inner.iteration;
        inner.iteration += 1;
        inner.last_result = Some(Rc::clone(&value));
        (
            inner.subscribers.keys().copied().collect::<Vec<_>>(),
            iteration,
            value,
        )
    };
    trace!("Emitting iteration {} to {} subscribers", iteration, ids.len());

    for id in ids {
        let pending = match shared.borrow_mut().subscribers.get_mut(&id) {
            Some(subscriber) => subscriber.emit_cleanup.take(),
            None => continue,
        };
        if let Some(cleanup) = pending {
            cleanup();
        }

        let callback = match shared.borrow_mut().subscribers.get_mut(&id) {
            Some(subscriber) => subscriber.listeners.on_emit.take(),
            None => continue,
        };
        let Some(mut callback) = callback else {
            continue;
        };

        let next_cleanup = callback(&value, iteration);

        let orphaned = {
            let mut inner = shared.borrow_mut();
            let active = !inner.state.is_terminal();
            match inner.subscribers.get_mut(&id) {
                Some(subscriber) => {
                    subscriber.listeners.on_emit.get_or_insert(callback);
                    match next_cleanup {
                        Some(cleanup) => subscriber.emit_cleanup.replace(cleanup),
                        None => None,
                    }
                }
                // Unsubscribed from inside its own callback.
                None if active => next_cleanup,
                None => None,
            }
        };
        if let Some(cleanup) = orphaned {
            cleanup();
        }
    }
}

fn reject<T: 'static, E: 'static>(shared: &Shared<T, E>, error: E) -> Result<(), ProgressError> {
    let (subscribers, error) = {
        let mut inner = shared.borrow_mut();
        inner.ensure_active("reject")?;
        let error = Rc::new(error);
        inner.error = Some(Rc::clone(&error));
        inner.state = ProgressState::Errored;
        (std::mem::take(&mut inner.subscribers), error)
    };
    debug!("Progress rejected, notifying {} subscribers", subscribers.len());

    let mut released = Vec::with_capacity(subscribers.len());
    for (_, mut subscriber) in subscribers {
        if let Some(on_error) = subscriber.listeners.on_error.take() {
            on_error(&error);
        }
        released.push(subscriber);
    }
    drop(released);
    Ok(())
}

fn finish<T: 'static, E: 'static>(shared: &Shared<T, E>) -> Result<(), ProgressError> {
    let subscribers = {
        let mut inner = shared.borrow_mut();
        inner.ensure_active("finish")?;
        inner.state = ProgressState::Finished;
        std::mem::take(&mut inner.subscribers)
    };
    debug!("Progress finished, notifying {} subscribers", subscribers.len());

    let mut released = Vec::with_capacity(subscribers.len());
    for (_, mut subscriber) in subscribers {
        if let Some(on_finish) = subscriber.listeners.on_finish.take() {
            on_finish();
        }
        released.push(subscriber);
    }
    drop(released);
    Ok(())
}

fn stop_now<T: 'static, E: 'static>(shared: &Shared<T, E>) {
    let teardown = {
        let mut inner = shared.borrow_mut();
        inner.stopped = true;
        if !inner.producer_ran {
            debug!("Progress stopped before its producer ran");
        }
        inner.teardown.take()
    };
    if let Some(teardown) = teardown {
        trace!("Running producer teardown");
        teardown();
    }

    if shared.borrow().state.is_terminal() {
        let leftovers = std::mem::take(&mut shared.borrow_mut().subscribers);
        drop(leftovers);
        return;
    }
    if let Err(err) = finish(shared) {
        trace!("Stream closed during teardown: {}", err);
    }
}

impl<T, E> SubscriptionTarget for RefCell<Inner<T, E>> {
    fn release(&self, id: SubscriptionId) {
        let Some(subscriber) = self.borrow_mut().subscribers.remove(&id) else {
            return;
        };
        trace!("Releasing subscriber {}", id);
        if let Some(cleanup) = subscriber.emit_cleanup {
            cleanup();
        }
        for (_, hook) in subscriber.hooks {
            hook();
        }
    }

    fn add_hook(&self, id: SubscriptionId, hook: Cleanup) -> Option<HookId> {
        let mut inner = self.borrow_mut();
        let hook_id = HookId(inner.next_hook);
        let subscriber = inner.subscribers.get_mut(&id)?;
        subscriber.hooks.push((hook_id, hook));
        inner.next_hook += 1;
        Some(hook_id)
    }

    fn remove_hook(&self, id: SubscriptionId, hook: HookId) {
        let removed = {
            let mut inner = self.borrow_mut();
            inner.subscribers.get_mut(&id).and_then(|subscriber| {
                let position = subscriber.hooks.iter().position(|(h, _)| *h == hook)?;
                Some(subscriber.hooks.remove(position))
            })
        };
        drop(removed);
    }
}
