// file: src/services/container.rs
// description: named service factories with optional singleton reuse
// reference: https://doc.rust-lang.org/std/any/trait.Any.html

use crate::error::ServiceError;
use std::any::{Any, type_name};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

type Factory = Box<dyn Fn() -> Rc<dyn Any>>;

#[derive(Default)]
pub struct ServiceContainerBuilder {
    factories: BTreeMap<String, Factory>,
    reused: BTreeSet<String>,
}

impl ServiceContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory called on every lookup.
    pub fn service<S: 'static>(mut self, name: &str, factory: impl Fn() -> S + 'static) -> Self {
        self.factories
            .insert(name.to_string(), Box::new(move || Rc::new(factory()) as Rc<dyn Any>));
        self
    }

    /// Registers a factory whose instance is created once and shared.
    pub fn reused_service<S: 'static>(self, name: &str, factory: impl Fn() -> S + 'static) -> Self {
        self.service(name, factory).reuse(name)
    }

    pub fn reuse(mut self, name: &str) -> Self {
        self.reused.insert(name.to_string());
        self
    }

    pub fn build(self) -> ServiceContainer {
        for name in &self.reused {
            if !self.factories.contains_key(name) {
                warn!("Service '{}' is marked as reused but has no factory", name);
            }
        }
        debug!("Service container built with {} services", self.factories.len());

        ServiceContainer {
            factories: self.factories,
            reused: self.reused,
            instances: RefCell::new(BTreeMap::new()),
        }
    }
}

pub struct ServiceContainer {
    factories: BTreeMap<String, Factory>,
    reused: BTreeSet<String>,
    instances: RefCell<BTreeMap<String, Rc<dyn Any>>>,
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.names())
            .field("reused", &self.reused)
            .finish()
    }
}

impl ServiceContainer {
    pub fn builder() -> ServiceContainerBuilder {
        ServiceContainerBuilder::new()
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn get<S: 'static>(&self, name: &str) -> Result<Rc<S>, ServiceError> {
        let factory = self.factories.get(name).ok_or_else(|| ServiceError::NotFound {
            name: name.to_string(),
            available: self.names(),
        })?;

        let instance = if self.reused.contains(name) {
            let cached = self.instances.borrow().get(name).cloned();
            match cached {
                Some(instance) => instance,
                None => {
                    // Factory runs outside the borrow so it may resolve other services.
                    let instance = factory();
                    debug!("Created reused service '{}'", name);
                    self.instances
                        .borrow_mut()
                        .entry(name.to_string())
                        .or_insert(instance)
                        .clone()
                }
            }
        } else {
            factory()
        };

        instance
            .downcast::<S>()
            .map_err(|_| ServiceError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<S>(),
            })
    }
}
