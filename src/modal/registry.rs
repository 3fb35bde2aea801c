// file: src/modal/registry.rs
// description: open/closed bookkeeping for modals and their pending resolvers
// reference: https://docs.rs/chrono

use crate::error::ModalError;
use crate::progress::{Progress, ProgressController};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Called once with the close result, `None` when closed without one.
pub type Resolver = Box<dyn FnOnce(Option<Box<dyn Any>>)>;

/// Renderer-facing snapshot of a registered modal.
#[derive(Debug, Clone)]
pub struct ModalView {
    pub id: String,
    pub component: String,
    pub open: bool,
    pub data: Option<Rc<dyn Any>>,
    pub opened_at: DateTime<Utc>,
}

impl ModalView {
    pub fn data<D: 'static>(&self) -> Option<&D> {
        self.data.as_ref().and_then(|data| data.downcast_ref::<D>())
    }
}

struct ModalEntry {
    view: ModalView,
    resolver: Option<Resolver>,
}

struct RegistryInner {
    max_modals: Option<usize>,
    entries: Vec<ModalEntry>,
}

impl RegistryInner {
    fn entry_mut(&mut self, id: &str) -> Option<&mut ModalEntry> {
        self.entries.iter_mut().find(|entry| entry.view.id == id)
    }

    fn open_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.view.open).count()
    }

    fn views(&self) -> Vec<ModalView> {
        self.entries.iter().map(|entry| entry.view.clone()).collect()
    }
}

/// Shared registry of modals. Closed modals stay registered so a renderer
/// can animate them out; reopening reuses the entry.
#[derive(Clone)]
pub struct ModalRegistry {
    inner: Rc<RefCell<RegistryInner>>,
    changes: ProgressController<Vec<ModalView>, Infallible>,
}

impl fmt::Debug for ModalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ModalRegistry")
            .field("max_modals", &inner.max_modals)
            .field("registered", &inner.entries.len())
            .field("open", &inner.open_count())
            .finish()
    }
}

impl Default for ModalRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModalRegistry {
    pub fn new(max_modals: Option<usize>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                max_modals,
                entries: Vec::new(),
            })),
            changes: ProgressController::new(),
        }
    }

    pub fn max_modals(&self) -> Option<usize> {
        self.inner.borrow().max_modals
    }

    pub fn open_count(&self) -> usize {
        self.inner.borrow().open_count()
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.inner
            .borrow()
            .entries
            .iter()
            .any(|entry| entry.view.id == id && entry.view.open)
    }

    /// All registered modals in registration order.
    pub fn views(&self) -> Vec<ModalView> {
        self.inner.borrow().views()
    }

    /// Every later `views()` snapshot.
    pub fn changes(&self) -> Progress<Vec<ModalView>, Infallible> {
        self.changes.as_progress()
    }

    pub fn open(
        &self,
        id: &str,
        component: &str,
        data: Option<Rc<dyn Any>>,
        resolver: Resolver,
    ) -> Result<(), ModalError> {
        {
            let mut inner = self.inner.borrow_mut();
            let registered = inner.entries.iter().find(|entry| entry.view.id == id);
            if registered.is_some_and(|entry| entry.view.open) {
                return Err(ModalError::AlreadyOpen(id.to_string()));
            }
            if let Some(limit) = inner.max_modals {
                if inner.open_count() >= limit {
                    return Err(ModalError::LimitReached {
                        id: id.to_string(),
                        limit,
                    });
                }
            }

            let view = ModalView {
                id: id.to_string(),
                component: component.to_string(),
                open: true,
                data,
                opened_at: Utc::now(),
            };
            match inner.entry_mut(id) {
                Some(entry) => {
                    entry.view = view;
                    entry.resolver = Some(resolver);
                }
                None => inner.entries.push(ModalEntry {
                    view,
                    resolver: Some(resolver),
                }),
            }
        }
        debug!("Opened modal {} ({})", id, component);
        self.publish();
        Ok(())
    }

    /// Marks the modal closed and resolves its opener with `result`.
    pub fn close(&self, id: &str, result: Option<Box<dyn Any>>) -> Result<(), ModalError> {
        let resolver = self.mark_closed(id)?;
        debug!("Closed modal {}", id);
        self.publish();
        match resolver {
            Some(resolve) => resolve(result),
            None => warn!("Modal {} closed without a pending opener", id),
        }
        Ok(())
    }

    /// Closes the modal without resolving its opener.
    pub fn dismiss(&self, id: &str) -> Result<(), ModalError> {
        let resolver = self.mark_closed(id)?;
        drop(resolver);
        debug!("Dismissed modal {}", id);
        self.publish();
        Ok(())
    }

    fn mark_closed(&self, id: &str) -> Result<Option<Resolver>, ModalError> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .entry_mut(id)
            .ok_or_else(|| ModalError::NotFound(id.to_string()))?;
        if !entry.view.open {
            return Err(ModalError::NotOpen(id.to_string()));
        }
        entry.view.open = false;
        Ok(entry.resolver.take())
    }

    fn publish(&self) {
        let views = self.views();
        if let Err(err) = self.changes.emit(views) {
            trace!("Modal change dropped: {}", err);
        }
    }
}
