// file: src/services/rest_handler.rs
// description: service handler specialised for http request progress streams

use super::handler::StateCell;
use crate::error::HttpError;
use crate::http::{HttpEvent, HttpResponse};
use crate::progress::{Cleanup, Listeners, Progress};
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestState {
    pub is_loading: bool,
    pub result: Option<HttpResponse>,
    pub error: Option<HttpError>,
}

type RestMethod<A> = Rc<dyn Fn(A) -> Progress<HttpEvent, HttpError>>;
type PercentListener = Box<dyn FnMut(u8)>;

struct RestShared {
    state: StateCell<RestState>,
    download: Cell<u8>,
    download_listeners: RefCell<Vec<PercentListener>>,
}

impl RestShared {
    fn report_download(&self, percentage: u8) {
        self.download.set(percentage);
        let mut listeners = std::mem::take(&mut *self.download_listeners.borrow_mut());
        for listener in listeners.iter_mut() {
            listener(percentage);
        }
        let mut slot = self.download_listeners.borrow_mut();
        let added = std::mem::take(&mut *slot);
        listeners.extend(added);
        *slot = listeners;
    }
}

/// Invokes a request-producing method and tracks `{ is_loading, result, error }`
/// plus the download percentage.
pub struct RestServiceHandler<A> {
    method: RestMethod<A>,
    shared: Rc<RestShared>,
}

impl<A> Clone for RestServiceHandler<A> {
    fn clone(&self) -> Self {
        Self {
            method: Rc::clone(&self.method),
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<A> fmt::Debug for RestServiceHandler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestServiceHandler")
            .field("state", &self.shared.state.snapshot())
            .field("download", &self.shared.download.get())
            .finish()
    }
}

impl<A: 'static> RestServiceHandler<A> {
    pub fn new(method: impl Fn(A) -> Progress<HttpEvent, HttpError> + 'static) -> Self {
        Self {
            method: Rc::new(method),
            shared: Rc::new(RestShared {
                state: StateCell::new(RestState::default()),
                download: Cell::new(0),
                download_listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Starts a request. The returned cleanup clears `is_loading` if the
    /// request is still in flight and aborts it.
    pub fn invoke(&self, args: A) -> Cleanup {
        self.shared.state.update(|state| {
            state.is_loading = true;
            true
        });
        self.shared.download.set(0);

        let progress = (self.method)(args);
        let on_emit = Rc::clone(&self.shared);
        let on_error = Rc::clone(&self.shared);
        let subscription = progress.subscribe(
            Listeners::emit(move |event: &HttpEvent, _| match event {
                HttpEvent::DownloadProgress(transfer) => on_emit.report_download(transfer.percentage()),
                HttpEvent::Response(response) => on_emit.state.update(|state| {
                    state.is_loading = false;
                    state.result = Some(response.clone());
                    true
                }),
            })
            .on_error(move |error: &HttpError| {
                on_error.state.update(|state| {
                    state.is_loading = false;
                    state.error = Some(error.clone());
                    true
                })
            }),
        );

        let shared = Rc::clone(&self.shared);
        Box::new(move || {
            shared.state.update(|state| {
                if !state.is_loading {
                    return false;
                }
                debug!("Cancelling in-flight request");
                state.is_loading = false;
                true
            });
            subscription.unsubscribe();
            progress.stop();
        })
    }

    pub fn state(&self) -> RestState {
        self.shared.state.snapshot()
    }

    pub fn state_changes(&self) -> Progress<RestState, Infallible> {
        self.shared.state.changes()
    }

    /// Last reported download percentage of the current request.
    pub fn download_progress(&self) -> u8 {
        self.shared.download.get()
    }

    pub fn on_download_progress(&self, listener: impl FnMut(u8) + 'static) {
        self.shared
            .download_listeners
            .borrow_mut()
            .push(Box::new(listener));
    }
}
