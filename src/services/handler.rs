// file: src/services/handler.rs
// description: loading/response/error state tracking around a service method
// reference: state snapshots are published through a progress controller

use crate::progress::{Listeners, Progress, ProgressController, Subscription};
use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceState<T, E> {
    pub is_loading: bool,
    pub response: Option<T>,
    pub error: Option<E>,
}

impl<T, E> Default for ServiceState<T, E> {
    fn default() -> Self {
        Self {
            is_loading: false,
            response: None,
            error: None,
        }
    }
}

/// What a service method hands back: a progress stream or a one-shot future.
pub enum ServiceCall<T, E> {
    Progress(Progress<T, E>),
    Future(Pin<Box<dyn Future<Output = Result<T, E>>>>),
}

impl<T: 'static, E: 'static> ServiceCall<T, E> {
    pub fn future(future: impl Future<Output = Result<T, E>> + 'static) -> Self {
        ServiceCall::Future(Box::pin(future))
    }

    /// Futures are spawned on the current `LocalSet`.
    pub fn into_progress(self) -> Progress<T, E> {
        match self {
            ServiceCall::Progress(progress) => progress,
            ServiceCall::Future(future) => Progress::from_future(future),
        }
    }
}

impl<T, E> From<Progress<T, E>> for ServiceCall<T, E> {
    fn from(progress: Progress<T, E>) -> Self {
        ServiceCall::Progress(progress)
    }
}

impl<T, E> fmt::Debug for ServiceCall<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceCall::Progress(progress) => f.debug_tuple("Progress").field(progress).finish(),
            ServiceCall::Future(_) => f.write_str("Future(..)"),
        }
    }
}

/// Shared state cell that republishes every change.
pub(crate) struct StateCell<S> {
    state: RefCell<S>,
    changes: ProgressController<S, Infallible>,
}

impl<S: Clone + 'static> StateCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        Self {
            state: RefCell::new(initial),
            changes: ProgressController::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> S {
        self.state.borrow().clone()
    }

    pub(crate) fn changes(&self) -> Progress<S, Infallible> {
        self.changes.as_progress()
    }

    /// Applies `change` and publishes the result when `change` reports one.
    pub(crate) fn update(&self, change: impl FnOnce(&mut S) -> bool) {
        let snapshot = {
            let mut state = self.state.borrow_mut();
            if !change(&mut state) {
                return;
            }
            state.clone()
        };
        if let Err(err) = self.changes.emit(snapshot) {
            trace!("State change dropped: {}", err);
        }
    }
}

type ServiceMethod<A, T, E> = Rc<dyn Fn(A) -> ServiceCall<T, E>>;

/// Invokes a service method and tracks `{ is_loading, response, error }`.
///
/// Response and error are kept across invocations; only `is_loading` is
/// reset when a new call starts.
pub struct ServiceHandler<A, T, E> {
    method: ServiceMethod<A, T, E>,
    shared: Rc<StateCell<ServiceState<T, E>>>,
}

impl<A, T, E> Clone for ServiceHandler<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            method: Rc::clone(&self.method),
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<A, T, E> fmt::Debug for ServiceHandler<A, T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandler")
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

impl<A, T, E> ServiceHandler<A, T, E>
where
    A: 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn new<C>(method: impl Fn(A) -> C + 'static) -> Self
    where
        C: Into<ServiceCall<T, E>>,
    {
        Self {
            method: Rc::new(move |args| method(args).into()),
            shared: Rc::new(StateCell::new(ServiceState::default())),
        }
    }

    /// Starts a call. Unsubscribing the returned subscription stops state
    /// updates from this call.
    pub fn invoke(&self, args: A) -> Subscription {
        self.shared.update(|state| {
            state.is_loading = true;
            true
        });

        let progress = (self.method)(args).into_progress();
        let on_emit = Rc::clone(&self.shared);
        let on_error = Rc::clone(&self.shared);
        progress.subscribe(
            Listeners::emit(move |value: &T, _| {
                on_emit.update(|state| {
                    state.is_loading = false;
                    state.response = Some(value.clone());
                    true
                })
            })
            .on_error(move |error: &E| {
                on_error.update(|state| {
                    state.is_loading = false;
                    state.error = Some(error.clone());
                    true
                })
            }),
        )
    }

    pub fn state(&self) -> ServiceState<T, E> {
        self.shared.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().is_loading
    }

    /// Every later state snapshot, in order.
    pub fn state_changes(&self) -> Progress<ServiceState<T, E>, Infallible> {
        self.shared.changes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Emitter;
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    type Slot = Rc<RefCell<Option<Emitter<String, String>>>>;

    fn manual_service() -> (ServiceHandler<u32, String, String>, Slot) {
        let slot: Slot = Rc::new(RefCell::new(None));
        let producer_slot = slot.clone();
        let handler = ServiceHandler::new(move |id: u32| {
            let slot = producer_slot.clone();
            Progress::new(move |emitter| {
                assert!(id > 0);
                *slot.borrow_mut() = Some(emitter);
                None
            })
        });
        (handler, slot)
    }

    fn emitter(slot: &Slot) -> Emitter<String, String> {
        slot.borrow().clone().unwrap()
    }

    #[test]
    fn test_invoke_tracks_loading_and_response() {
        let (handler, slot) = manual_service();
        assert_eq!(handler.state(), ServiceState::default());

        let _subscription = handler.invoke(1);
        assert!(handler.is_loading());

        emitter(&slot).emit("todo".to_string()).unwrap();
        assert_eq!(
            handler.state(),
            ServiceState {
                is_loading: false,
                response: Some("todo".to_string()),
                error: None
            }
        );
    }

    #[test]
    fn test_error_keeps_previous_response() {
        let (handler, slot) = manual_service();
        let _first = handler.invoke(1);
        emitter(&slot).emit("todo".to_string()).unwrap();

        let _second = handler.invoke(2);
        emitter(&slot).reject("offline".to_string()).unwrap();

        let state = handler.state();
        assert!(!state.is_loading);
        assert_eq!(state.response.as_deref(), Some("todo"));
        assert_eq!(state.error.as_deref(), Some("offline"));
    }

    #[test]
    fn test_unsubscribe_ignores_later_emissions() {
        let (handler, slot) = manual_service();
        let subscription = handler.invoke(1);
        subscription.unsubscribe();

        emitter(&slot).emit("late".to_string()).unwrap();
        assert_eq!(handler.state().response, None);
        assert!(handler.is_loading());
    }

    #[test]
    fn test_state_changes_publish_snapshots() {
        let (handler, slot) = manual_service();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        handler
            .state_changes()
            .subscribe(Listeners::emit(move |state: &ServiceState<String, String>, _| {
                sink.borrow_mut().push((state.is_loading, state.response.clone()))
            }));

        let _subscription = handler.invoke(1);
        emitter(&slot).emit("a".to_string()).unwrap();
        emitter(&slot).emit("b".to_string()).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (true, None),
                (false, Some("a".to_string())),
                (false, Some("b".to_string())),
            ]
        );
    }

    #[test]
    fn test_listener_may_read_state_during_update() {
        let (handler, slot) = manual_service();
        let reader = handler.clone();
        let observed = Rc::new(RefCell::new(None));
        let sink = observed.clone();
        handler
            .state_changes()
            .subscribe(Listeners::emit(move |_: &ServiceState<String, String>, _| {
                *sink.borrow_mut() = reader.state().response;
            }));

        let _subscription = handler.invoke(1);
        emitter(&slot).emit("x".to_string()).unwrap();
        assert_eq!(observed.borrow().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_future_service_method() {
        LocalSet::new()
            .run_until(async {
                let handler: ServiceHandler<u32, u32, String> = ServiceHandler::new(|n: u32| {
                    ServiceCall::future(async move {
                        if n == 0 {
                            Err("zero".to_string())
                        } else {
                            Ok(n * 2)
                        }
                    })
                });

                let (tx, rx) = oneshot::channel();
                let tx = RefCell::new(Some(tx));
                handler
                    .state_changes()
                    .subscribe(Listeners::emit(move |state: &ServiceState<u32, String>, _| {
                        if !state.is_loading {
                            if let Some(tx) = tx.borrow_mut().take() {
                                let _ = tx.send(state.clone());
                            }
                        }
                    }));

                let _subscription = handler.invoke(21);
                let settled = rx.await.unwrap();
                assert_eq!(settled.response, Some(42));
                assert_eq!(settled.error, None);
            })
            .await;
    }
}
