// file: src/progress/listeners.rs
// description: subscriber callback sets and subscription handles
// reference: optional-callback listener records with identity-based removal

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Cleanup returned by producers (teardown), by emit callbacks
/// (per-emission cleanup) and registered as unsubscribe hooks.
pub type Cleanup = Box<dyn FnOnce()>;

pub(crate) type EmitCallback<T> = Box<dyn FnMut(&T, u64) -> Option<Cleanup>>;
pub(crate) type ErrorCallback<E> = Box<dyn FnOnce(&E)>;
pub(crate) type FinishCallback = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct HookId(pub(crate) u64);

/// The callbacks a subscriber cares about. Every slot is optional.
///
/// ```
/// use reactik::progress::Listeners;
///
/// let listeners: Listeners<u32, String> = Listeners::new()
///     .on_emit(|value, iteration| println!("#{iteration}: {value}"))
///     .on_error(|err| eprintln!("failed: {err}"));
/// # drop(listeners);
/// ```
pub struct Listeners<T, E> {
    pub(crate) on_emit: Option<EmitCallback<T>>,
    pub(crate) on_error: Option<ErrorCallback<E>>,
    pub(crate) on_finish: Option<FinishCallback>,
}

impl<T, E> Default for Listeners<T, E> {
    fn default() -> Self {
        Self {
            on_emit: None,
            on_error: None,
            on_finish: None,
        }
    }
}

impl<T, E> Listeners<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a subscriber that only listens to emissions.
    pub fn emit(on_emit: impl FnMut(&T, u64) + 'static) -> Self {
        Self::new().on_emit(on_emit)
    }

    pub fn on_emit(mut self, mut on_emit: impl FnMut(&T, u64) + 'static) -> Self {
        self.on_emit = Some(Box::new(move |value, iteration| {
            on_emit(value, iteration);
            None
        }));
        self
    }

    /// Like [`Listeners::on_emit`], but the callback may return a cleanup that
    /// runs right before the next emission reaches this subscriber, or when
    /// it unsubscribes.
    pub fn on_emit_with_cleanup(
        mut self,
        on_emit: impl FnMut(&T, u64) -> Option<Cleanup> + 'static,
    ) -> Self {
        self.on_emit = Some(Box::new(on_emit));
        self
    }

    pub fn on_error(mut self, on_error: impl FnOnce(&E) + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn on_finish(mut self, on_finish: impl FnOnce() + 'static) -> Self {
        self.on_finish = Some(Box::new(on_finish));
        self
    }
}

impl<T, E> fmt::Debug for Listeners<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("on_emit", &self.on_emit.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Bookkeeping side of a subscription, implemented by the progress state.
pub(crate) trait SubscriptionTarget {
    fn release(&self, id: SubscriptionId);
    fn add_hook(&self, id: SubscriptionId, hook: Cleanup) -> Option<HookId>;
    fn remove_hook(&self, id: SubscriptionId, hook: HookId);
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe. Handles obtained from a stream
/// that was already terminal are detached: every method is a no-op.
pub struct Subscription {
    link: Option<(Rc<dyn SubscriptionTarget>, SubscriptionId)>,
    released: Cell<bool>,
}

impl Subscription {
    pub(crate) fn attached(target: Rc<dyn SubscriptionTarget>, id: SubscriptionId) -> Self {
        Self {
            link: Some((target, id)),
            released: Cell::new(false),
        }
    }

    pub(crate) fn detached() -> Self {
        Self {
            link: None,
            released: Cell::new(true),
        }
    }

    pub fn id(&self) -> Option<SubscriptionId> {
        self.link.as_ref().map(|(_, id)| *id)
    }

    pub fn is_closed(&self) -> bool {
        self.released.get()
    }

    /// Runs the pending per-emission cleanup, then every unsubscribe hook in
    /// registration order, and drops the subscriber's bookkeeping. Calling it
    /// again has no effect.
    pub fn unsubscribe(&self) {
        if self.released.replace(true) {
            return;
        }
        if let Some((target, id)) = &self.link {
            target.release(*id);
        }
    }

    /// Registers a hook that runs once when this subscription is released.
    /// The returned remover deletes exactly this hook.
    pub fn on_unsubscribe(&self, hook: impl FnOnce() + 'static) -> HookRemover {
        if self.released.get() {
            return HookRemover { link: None };
        }
        match &self.link {
            Some((target, id)) => {
                let link = target
                    .add_hook(*id, Box::new(hook))
                    .map(|hook_id| (Rc::clone(target), *id, hook_id));
                HookRemover { link }
            }
            None => HookRemover { link: None },
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Removes a single unsubscribe hook.
#[must_use = "dropping the remover keeps the hook registered"]
pub struct HookRemover {
    link: Option<(Rc<dyn SubscriptionTarget>, SubscriptionId, HookId)>,
}

impl HookRemover {
    pub fn remove(self) {
        if let Some((target, id, hook)) = self.link {
            target.remove_hook(id, hook);
        }
    }
}

impl fmt::Debug for HookRemover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRemover")
            .field("attached", &self.link.is_some())
            .finish()
    }
}
