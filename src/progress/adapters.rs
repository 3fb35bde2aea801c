// file: src/progress/adapters.rs
// description: adapt futures and streams into progress values
// reference: https://docs.rs/tokio/latest/tokio/task/fn.spawn_local.html

use super::stream::Progress;
use super::listeners::Cleanup;
use futures::{Stream, StreamExt};
use std::future::Future;
use tracing::trace;

impl<T: 'static, E: 'static> Progress<T, E> {
    /// Runs `future` as a local task: `Ok` emits once and finishes, `Err`
    /// rejects. Stopping the progress aborts the task.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio `LocalSet`.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + 'static,
    {
        Self::new(move |emitter| {
            let task = tokio::task::spawn_local(async move {
                let outcome = match future.await {
                    Ok(value) => emitter.emit(value).and_then(|_| emitter.finish()),
                    Err(err) => emitter.reject(err),
                };
                if let Err(violation) = outcome {
                    trace!("Future settled after its progress closed: {}", violation);
                }
            });
            Some(Box::new(move || task.abort()) as Cleanup)
        })
    }

    /// Emits every `Ok` item of `stream`, rejects on the first `Err` and
    /// finishes when the stream ends. Stopping the progress aborts the task.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio `LocalSet`.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + 'static,
    {
        Self::new(move |emitter| {
            let task = tokio::task::spawn_local(async move {
                let mut stream = Box::pin(stream);
                while let Some(item) = stream.next().await {
                    let outcome = match item {
                        Ok(value) => emitter.emit(value),
                        Err(err) => {
                            if let Err(violation) = emitter.reject(err) {
                                trace!("Stream failed after its progress closed: {}", violation);
                            }
                            return;
                        }
                    };
                    if outcome.is_err() {
                        trace!("Progress closed, dropping the rest of the stream");
                        return;
                    }
                }
                if let Err(violation) = emitter.finish() {
                    trace!("Stream ended after its progress closed: {}", violation);
                }
            });
            Some(Box::new(move || task.abort()) as Cleanup)
        })
    }
}
