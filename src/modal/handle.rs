// file: src/modal/handle.rs
// description: typed opener for a single modal id
// reference: https://docs.rs/uuid

use super::registry::{ModalRegistry, Resolver};
use crate::error::ModalError;
use crate::progress::{Cleanup, Progress};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use tracing::{trace, warn};
use uuid::Uuid;

/// Opens a modal with data `D` and receives its close result `R`.
pub struct ModalHandle<D, R> {
    registry: ModalRegistry,
    id: String,
    component: String,
    default_data: Option<D>,
    _result: PhantomData<fn() -> R>,
}

impl<D: Clone, R> Clone for ModalHandle<D, R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            id: self.id.clone(),
            component: self.component.clone(),
            default_data: self.default_data.clone(),
            _result: PhantomData,
        }
    }
}

impl<D, R> fmt::Debug for ModalHandle<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModalHandle")
            .field("id", &self.id)
            .field("component", &self.component)
            .finish()
    }
}

impl<D: Clone + 'static, R: 'static> ModalHandle<D, R> {
    /// A handle with a freshly generated id.
    pub fn new(registry: &ModalRegistry, component: &str) -> Self {
        Self::with_id(registry, component, &Uuid::new_v4().to_string())
    }

    pub fn with_id(registry: &ModalRegistry, component: &str, id: &str) -> Self {
        Self {
            registry: registry.clone(),
            id: id.to_string(),
            component: component.to_string(),
            default_data: None,
            _result: PhantomData,
        }
    }

    /// Data used when `open` is called without any.
    pub fn with_default_data(mut self, data: D) -> Self {
        self.default_data = Some(data);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.registry.is_open(&self.id)
    }

    /// Opens the modal. The progress emits the close result once and
    /// finishes; a result of the wrong type arrives as `None`. Stopping the
    /// progress dismisses the modal.
    pub fn open(&self, data: Option<D>) -> Progress<Option<R>, ModalError> {
        let registry = self.registry.clone();
        let id = self.id.clone();
        let component = self.component.clone();
        let data = data
            .or_else(|| self.default_data.clone())
            .map(|data| Rc::new(data) as Rc<dyn Any>);

        Progress::new(move |emitter| {
            let resolve = emitter.clone();
            let resolve_id = id.clone();
            let resolver: Resolver = Box::new(move |result| {
                let typed = match result.map(|result| result.downcast::<R>()) {
                    None => None,
                    Some(Ok(result)) => Some(*result),
                    Some(Err(_)) => {
                        warn!("Modal {} closed with a result of an unexpected type", resolve_id);
                        None
                    }
                };
                if let Err(violation) = resolve.emit(typed).and_then(|_| resolve.finish()) {
                    trace!("Modal {} resolved after its progress closed: {}", resolve_id, violation);
                }
            });

            if let Err(err) = registry.open(&id, &component, data, resolver) {
                if let Err(violation) = emitter.reject(err) {
                    trace!("Modal {} open failure dropped: {}", id, violation);
                }
                return None;
            }

            Some(Box::new(move || {
                if registry.is_open(&id) {
                    if let Err(err) = registry.dismiss(&id) {
                        trace!("Modal {} already gone on stop: {}", id, err);
                    }
                }
            }) as Cleanup)
        })
    }

    /// Closes the modal with `result`, resolving the pending `open`.
    pub fn close(&self, result: Option<R>) -> Result<(), ModalError> {
        self.registry
            .close(&self.id, result.map(|result| Box::new(result) as Box<dyn Any>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{Listeners, ProgressState};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    struct Confirm {
        question: String,
    }

    fn record(progress: &Progress<Option<bool>, ModalError>) -> Rc<RefCell<Vec<String>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (on_emit, on_error, on_finish) = (events.clone(), events.clone(), events.clone());
        progress.subscribe(
            Listeners::emit(move |result: &Option<bool>, _| {
                on_emit.borrow_mut().push(format!("emit:{:?}", result))
            })
            .on_error(move |e: &ModalError| on_error.borrow_mut().push(format!("error:{}", e)))
            .on_finish(move || on_finish.borrow_mut().push("finish".to_string())),
        );
        events
    }

    #[test]
    fn test_open_then_close_emits_result_once() {
        let registry = ModalRegistry::default();
        let modal: ModalHandle<Confirm, bool> = ModalHandle::with_id(&registry, "ConfirmDialog", "confirm");

        let progress = modal.open(Some(Confirm {
            question: "Delete?".to_string(),
        }));
        let events = record(&progress);
        assert!(modal.is_open());
        assert_eq!(
            registry.views()[0].data::<Confirm>().map(|c| c.question.as_str()),
            Some("Delete?")
        );

        modal.close(Some(true)).unwrap();
        assert_eq!(*events.borrow(), vec!["emit:Some(true)", "finish"]);
        assert_eq!(progress.state(), ProgressState::Finished);
    }

    #[test]
    fn test_default_data_is_used_when_none_given() {
        let registry = ModalRegistry::default();
        let modal: ModalHandle<Confirm, bool> = ModalHandle::new(&registry, "ConfirmDialog")
            .with_default_data(Confirm {
                question: "Continue?".to_string(),
            });

        let _progress = modal.open(None);
        let views = registry.views();
        assert_eq!(views[0].id, modal.id());
        assert_eq!(
            views[0].data::<Confirm>().map(|c| c.question.as_str()),
            Some("Continue?")
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let registry = ModalRegistry::default();
        let a: ModalHandle<(), ()> = ModalHandle::new(&registry, "A");
        let b: ModalHandle<(), ()> = ModalHandle::new(&registry, "A");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_stop_dismisses_without_result() {
        let registry = ModalRegistry::default();
        let modal: ModalHandle<(), bool> = ModalHandle::with_id(&registry, "Dialog", "d");
        let progress = modal.open(None);
        let events = record(&progress);

        progress.stop();
        assert!(!modal.is_open());
        assert_eq!(*events.borrow(), vec!["finish"]);
        assert_eq!(modal.close(None), Err(ModalError::NotOpen("d".to_string())));
    }

    #[test]
    fn test_limit_rejects_open() {
        let registry = ModalRegistry::new(Some(1));
        let first: ModalHandle<(), bool> = ModalHandle::with_id(&registry, "A", "a");
        let second: ModalHandle<(), bool> = ModalHandle::with_id(&registry, "B", "b");

        let _open = first.open(None);
        let progress = second.open(None);
        let events = record(&progress);

        assert_eq!(progress.state(), ProgressState::Errored);
        assert_eq!(
            *events.borrow(),
            vec!["error:Cannot open modal 'b': limit of 1 open modals reached"]
        );
    }

    #[test]
    fn test_close_without_result_emits_none() {
        let registry = ModalRegistry::default();
        let modal: ModalHandle<(), bool> = ModalHandle::with_id(&registry, "Dialog", "d");
        let progress = modal.open(None);
        let events = record(&progress);

        modal.close(None).unwrap();
        assert_eq!(*events.borrow(), vec!["emit:None", "finish"]);
    }
}
