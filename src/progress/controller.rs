// file: src/progress/controller.rs
// description: imperative producer side that feeds any number of progress views
// reference: controller registers each view's emitter and forgets it on teardown

use super::stream::{Emitter, Progress, ProgressState};
use super::listeners::Cleanup;
use super::scheduler::{Immediate, Scheduler};
use crate::error::ProgressError;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

struct ControllerInner<T, E> {
    state: ProgressState,
    last_result: Option<T>,
    error: Option<E>,
    next_view: u64,
    views: BTreeMap<u64, Emitter<T, E>>,
}

enum ViewRegistration<T, E> {
    Live(u64),
    Closed {
        state: ProgressState,
        last_result: Option<T>,
        error: Option<E>,
    },
}

/// Lets imperative code push values without owning a producer closure.
///
/// Each call to [`ProgressController::as_progress`] creates an independent
/// view that receives every later emission. Stopping a view unregisters it.
/// A view created after the controller reached a terminal state replays the
/// last value (if any) and the terminal outcome.
pub struct ProgressController<T, E> {
    inner: Rc<RefCell<ControllerInner<T, E>>>,
    scheduler: Rc<dyn Scheduler>,
}

impl<T, E> Clone for ProgressController<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            scheduler: Rc::clone(&self.scheduler),
        }
    }
}

impl<T, E> fmt::Debug for ProgressController<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ProgressController")
            .field("state", &inner.state)
            .field("views", &inner.views.len())
            .finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Default for ProgressController<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> ProgressController<T, E> {
    pub fn new() -> Self {
        Self::with_scheduler(Rc::new(Immediate))
    }

    /// Views created by this controller use `scheduler` for their producer
    /// and `stop()`.
    pub fn with_scheduler(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ControllerInner {
                state: ProgressState::Active,
                last_result: None,
                error: None,
                next_view: 0,
                views: BTreeMap::new(),
            })),
            scheduler,
        }
    }

    pub fn state(&self) -> ProgressState {
        self.inner.borrow().state
    }

    pub fn last_result(&self) -> Option<T> {
        self.inner.borrow().last_result.clone()
    }

    pub fn error(&self) -> Option<E> {
        self.inner.borrow().error.clone()
    }

    pub fn view_count(&self) -> usize {
        self.inner.borrow().views.len()
    }

    pub fn emit(&self, value: T) -> Result<(), ProgressError> {
        let views = self.live_views("emit")?;
        for (id, view) in views {
            if let Err(err) = view.emit(value.clone()) {
                warn!("Progress view {} rejected an emission: {}", id, err);
            }
        }
        self.inner.borrow_mut().last_result = Some(value);
        Ok(())
    }

    pub fn reject(&self, error: E) -> Result<(), ProgressError> {
        self.live_views("reject")?;
        let views = {
            let mut inner = self.inner.borrow_mut();
            inner.state = ProgressState::Errored;
            inner.error = Some(error.clone());
            std::mem::take(&mut inner.views)
        };
        debug!("Controller rejected, closing {} views", views.len());
        for (id, view) in views {
            if let Err(err) = view.reject(error.clone()) {
                warn!("Progress view {} could not be rejected: {}", id, err);
            }
        }
        Ok(())
    }

    pub fn finish(&self) -> Result<(), ProgressError> {
        self.live_views("finish")?;
        let views = {
            let mut inner = self.inner.borrow_mut();
            inner.state = ProgressState::Finished;
            std::mem::take(&mut inner.views)
        };
        debug!("Controller finished, closing {} views", views.len());
        for (id, view) in views {
            if let Err(err) = view.finish() {
                warn!("Progress view {} could not be finished: {}", id, err);
            }
        }
        Ok(())
    }

    /// A new progress view fed by this controller.
    pub fn as_progress(&self) -> Progress<T, E> {
        let inner = Rc::clone(&self.inner);
        Progress::with_scheduler(Rc::clone(&self.scheduler), move |emitter| {
            let registration = {
                let mut controller = inner.borrow_mut();
                match controller.state {
                    ProgressState::Active => {
                        let id = controller.next_view;
                        controller.next_view += 1;
                        controller.views.insert(id, emitter.clone());
                        ViewRegistration::Live(id)
                    }
                    state => ViewRegistration::Closed {
                        state,
                        last_result: controller.last_result.clone(),
                        error: controller.error.clone(),
                    },
                }
            };

            match registration {
                ViewRegistration::Live(id) => Some(Box::new(move || {
                    let removed = inner.borrow_mut().views.remove(&id);
                    drop(removed);
                }) as Cleanup),
                ViewRegistration::Closed {
                    state,
                    last_result,
                    error,
                } => {
                    replay_terminal(&emitter, state, last_result, error);
                    None
                }
            }
        })
    }

    fn live_views(&self, operation: &'static str) -> Result<Vec<(u64, Emitter<T, E>)>, ProgressError> {
        let inner = self.inner.borrow();
        if inner.state.is_terminal() {
            return Err(ProgressError::AlreadyFinished { operation });
        }
        Ok(inner
            .views
            .iter()
            .map(|(id, view)| (*id, view.clone()))
            .collect())
    }
}

fn replay_terminal<T: 'static, E: 'static>(
    emitter: &Emitter<T, E>,
    state: ProgressState,
    last_result: Option<T>,
    error: Option<E>,
) {
    let outcome = match (state, error) {
        (ProgressState::Errored, Some(error)) => emitter.reject(error),
        _ => match last_result {
            Some(value) => emitter.emit(value).and_then(|_| emitter.finish()),
            None => emitter.finish(),
        },
    };
    if let Err(err) = outcome {
        warn!("Could not replay controller outcome: {}", err);
    }
}
