// file: src/progress/chain.rs
// description: switch-latest composition of a parent progress into child progresses
// reference: per-emission cleanup used to stop the previous child

use super::stream::{Emitter, Progress, ProgressState};
use super::listeners::{Cleanup, Listeners, Subscription};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Default)]
struct ChainLink {
    generation: u64,
    child_live: bool,
    parent_done: bool,
}

type ParentSlot = Rc<RefCell<Option<Subscription>>>;

impl<T: 'static, E: Clone + 'static> Progress<T, E> {
    /// Maps every emission of `self` to a child progress and forwards the
    /// child's emissions.
    ///
    /// Only the newest child is live: a new parent emission unsubscribes from
    /// and stops the previous child before `next` is called again. A parent
    /// error, or any child error, rejects the output. The output finishes once
    /// the parent has finished and the current child has finished too.
    /// Stopping the output stops the parent and the live child.
    ///
    /// The output runs on the parent's scheduler. A child is subscribed only
    /// after `next` returns, so a child whose producer emits synchronously
    /// (the default [`Immediate`](super::scheduler::Immediate) scheduler) and
    /// stays active loses those emissions; a child that finishes synchronously
    /// is replayed only its last value. Build such children with
    /// [`Progress::with_scheduler`] on a deferring scheduler, for example
    /// `self.scheduler()` when the parent uses a `TurnQueue`.
    pub fn chain<CT, CE, F>(&self, next: F) -> Progress<CT, E>
    where
        CT: Clone + 'static,
        CE: Clone + Into<E> + 'static,
        F: FnMut(&T) -> Progress<CT, CE> + 'static,
    {
        let parent = self.clone();
        Progress::with_scheduler(self.scheduler(), move |output: Emitter<CT, E>| {
            let link = Rc::new(RefCell::new(ChainLink::default()));
            let parent_slot: ParentSlot = Rc::new(RefCell::new(None));

            let listeners = Listeners::new()
                .on_emit_with_cleanup(spawn_child(
                    next,
                    output.clone(),
                    Rc::clone(&link),
                    Rc::clone(&parent_slot),
                ))
                .on_error({
                    let output = output.clone();
                    move |err: &E| forward_error(&output, err.clone())
                })
                .on_finish({
                    let output = output.clone();
                    let link = Rc::clone(&link);
                    move || parent_finished(&output, &link)
                });

            let subscription = parent.subscribe(listeners);
            if subscription.id().is_none() && parent.state() == ProgressState::Finished {
                // Late subscription: the finish itself is never replayed.
                parent_finished(&output, &link);
            }
            *parent_slot.borrow_mut() = Some(subscription);

            Some(Box::new(move || {
                let subscription = parent_slot.borrow_mut().take();
                if let Some(subscription) = subscription {
                    subscription.unsubscribe();
                }
                parent.stop();
            }) as Cleanup)
        })
    }
}

fn spawn_child<T, E, CT, CE, F>(
    mut next: F,
    output: Emitter<CT, E>,
    link: Rc<RefCell<ChainLink>>,
    parent_slot: ParentSlot,
) -> impl FnMut(&T, u64) -> Option<Cleanup> + 'static
where
    T: 'static,
    E: Clone + 'static,
    CT: Clone + 'static,
    CE: Clone + Into<E> + 'static,
    F: FnMut(&T) -> Progress<CT, CE> + 'static,
{
    move |result: &T, iteration: u64| {
        let generation = {
            let mut link = link.borrow_mut();
            link.generation += 1;
            link.child_live = true;
            link.generation
        };
        trace!("Chain spawning child {} for parent iteration {}", generation, iteration);

        let child = next(result);
        let child_listeners = Listeners::new()
            .on_emit({
                let output = output.clone();
                move |value: &CT, _| {
                    if let Err(err) = output.emit(value.clone()) {
                        trace!("Dropping child emission: {}", err);
                    }
                }
            })
            .on_error({
                let output = output.clone();
                let link = Rc::clone(&link);
                let parent_slot = Rc::clone(&parent_slot);
                move |err: &CE| {
                    link.borrow_mut().child_live = false;
                    let subscription = parent_slot.borrow_mut().take();
                    if let Some(subscription) = subscription {
                        subscription.unsubscribe();
                    }
                    forward_error(&output, err.clone().into());
                }
            })
            .on_finish({
                let output = output.clone();
                let link = Rc::clone(&link);
                move || {
                    let finish_output = {
                        let mut link = link.borrow_mut();
                        if link.generation != generation {
                            return;
                        }
                        link.child_live = false;
                        link.parent_done
                    };
                    if finish_output {
                        close(&output);
                    }
                }
            });
        let child_subscription = child.subscribe(child_listeners);
        if child_subscription.id().is_none() && child.state() == ProgressState::Finished {
            // Replayed children only deliver their last value, never the finish.
            let mut link = link.borrow_mut();
            if link.generation == generation {
                link.child_live = false;
            }
        }

        Some(Box::new(move || {
            child_subscription.unsubscribe();
            child.stop();
        }) as Cleanup)
    }
}

fn parent_finished<CT: 'static, E: 'static>(output: &Emitter<CT, E>, link: &RefCell<ChainLink>) {
    let finish_now = {
        let mut link = link.borrow_mut();
        link.parent_done = true;
        !link.child_live
    };
    if finish_now {
        close(output);
    }
}

fn forward_error<CT: 'static, E: 'static>(output: &Emitter<CT, E>, err: E) {
    if let Err(violation) = output.reject(err) {
        trace!("Chain output already closed: {}", violation);
    }
}

fn close<CT: 'static, E: 'static>(output: &Emitter<CT, E>) {
    if let Err(violation) = output.finish() {
        trace!("Chain output already closed: {}", violation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::scheduler::TurnQueue;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    type Slot = Rc<RefCell<Vec<Emitter<String, String>>>>;

    fn output_log(progress: &Progress<String, String>) -> Rc<RefCell<Vec<String>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (a, b, c) = (events.clone(), events.clone(), events.clone());
        progress.subscribe(
            Listeners::new()
                .on_emit(move |v: &String, _| a.borrow_mut().push(v.clone()))
                .on_error(move |e: &String| b.borrow_mut().push(format!("error:{e}")))
                .on_finish(move || c.borrow_mut().push("finish".to_string())),
        );
        events
    }

    fn parent() -> (Progress<u32, String>, Emitter<u32, String>) {
        let slot = Rc::new(RefCell::new(None));
        let sink = slot.clone();
        let progress = Progress::new(move |emitter| {
            *sink.borrow_mut() = Some(emitter);
            None
        });
        let emitter = slot.borrow_mut().take().unwrap();
        (progress, emitter)
    }

    /// Children stay open; their emitters land in `slot`, their teardowns
    /// bump `stopped`.
    fn manual_child(slot: &Slot, stopped: &Rc<Cell<u32>>) -> impl FnMut(&u32) -> Progress<String, String> + 'static {
        let slot = slot.clone();
        let stopped = stopped.clone();
        move |_id: &u32| {
            let slot = slot.clone();
            let stopped = stopped.clone();
            Progress::new(move |emitter| {
                slot.borrow_mut().push(emitter);
                Some(Box::new(move || stopped.set(stopped.get() + 1)) as Cleanup)
            })
        }
    }

    #[test]
    fn test_chain_forwards_child_emissions_for_profile_lookup() {
        let (users, user_emitter) = parent();
        let children: Slot = Rc::new(RefCell::new(Vec::new()));
        let stopped = Rc::new(Cell::new(0));
        let requested = Rc::new(RefCell::new(Vec::new()));
        let mut fetch_profile = manual_child(&children, &stopped);
        let seen = requested.clone();
        let profile = users.chain(move |id: &u32| {
            seen.borrow_mut().push(*id);
            fetch_profile(id)
        });
        let events = output_log(&profile);

        user_emitter.emit(7).unwrap();
        children.borrow()[0].emit("profile-7".to_string()).unwrap();

        assert_eq!(*requested.borrow(), vec![7]);
        assert_eq!(*events.borrow(), vec!["profile-7"]);

        profile.stop();
        assert_eq!(stopped.get(), 1);
        assert!(!children.borrow()[0].is_active());
        assert_eq!(users.state(), ProgressState::Finished);
        assert!(!user_emitter.is_active());
        assert_eq!(profile.state(), ProgressState::Finished);
        assert_eq!(*events.borrow(), vec!["profile-7", "finish"]);
    }

    #[test]
    fn test_chain_switches_to_latest_child() {
        let (source, source_emitter) = parent();
        let children: Slot = Rc::new(RefCell::new(Vec::new()));
        let stopped = Rc::new(Cell::new(0));
        let output = source.chain(manual_child(&children, &stopped));
        let events = output_log(&output);

        source_emitter.emit(1).unwrap();
        children.borrow()[0].emit("first-a".to_string()).unwrap();
        source_emitter.emit(2).unwrap();

        assert_eq!(stopped.get(), 1);
        assert!(!children.borrow()[0].is_active());
        // The stale child cannot reach the output any more.
        assert!(children.borrow()[0].emit("first-b".to_string()).is_err());
        children.borrow()[1].emit("second-a".to_string()).unwrap();

        assert_eq!(*events.borrow(), vec!["first-a", "second-a"]);
    }

    #[test]
    fn test_child_finish_keeps_output_open_while_parent_active() {
        let (source, source_emitter) = parent();
        let children: Slot = Rc::new(RefCell::new(Vec::new()));
        let stopped = Rc::new(Cell::new(0));
        let output = source.chain(manual_child(&children, &stopped));
        let events = output_log(&output);

        source_emitter.emit(1).unwrap();
        children.borrow()[0].emit("a".to_string()).unwrap();
        children.borrow()[0].finish().unwrap();
        assert!(output.is_active());

        source_emitter.emit(2).unwrap();
        children.borrow()[1].emit("b".to_string()).unwrap();
        source_emitter.finish().unwrap();
        assert!(output.is_active());

        children.borrow()[1].finish().unwrap();
        assert_eq!(*events.borrow(), vec!["a", "b", "finish"]);
    }

    #[test]
    fn test_parent_finish_without_live_child_finishes_output() {
        let (source, source_emitter) = parent();
        let output = source.chain(|v: &u32| Progress::<String, String>::ready(v.to_string()));
        let events = output_log(&output);

        source_emitter.emit(3).unwrap();
        source_emitter.finish().unwrap();

        assert_eq!(*events.borrow(), vec!["3", "finish"]);
    }

    #[test]
    fn test_parent_error_rejects_output() {
        let (source, source_emitter) = parent();
        let output = source.chain(|v: &u32| Progress::<String, String>::ready(v.to_string()));
        let events = output_log(&output);

        source_emitter.reject("offline".to_string()).unwrap();

        assert_eq!(*events.borrow(), vec!["error:offline"]);
        assert_eq!(output.state(), ProgressState::Errored);
    }

    #[test]
    fn test_child_error_rejects_output_and_detaches_parent() {
        let (source, source_emitter) = parent();
        let output = source.chain(|id: &u32| {
            Progress::<String, String>::failed(format!("no profile for {id}"))
        });
        let events = output_log(&output);

        source_emitter.emit(9).unwrap();

        assert_eq!(*events.borrow(), vec!["error:no profile for 9"]);
        assert_eq!(source.subscriber_count(), 0);
        // Further parent emissions no longer spawn children.
        source_emitter.emit(10).unwrap();
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn test_chain_on_finished_parent_replays_and_finishes() {
        let source: Progress<u32, String> = Progress::ready(5);
        let output = source.chain(|v: &u32| Progress::<String, String>::ready(format!("#{v}")));
        let events = output_log(&output);

        assert_eq!(*events.borrow(), vec!["#5"]);
        assert_eq!(output.state(), ProgressState::Finished);
        assert_eq!(output.last_result().as_deref().map(String::as_str), Some("#5"));
    }

    #[test]
    fn test_deferred_child_forwards_producer_emissions() {
        let queue = TurnQueue::new();
        let (source, source_emitter) = parent();
        let child_queue = queue.clone();
        let output = source.chain(move |id: &u32| {
            let id = *id;
            Progress::<String, String>::with_scheduler(child_queue.clone(), move |emitter| {
                emitter.emit(format!("cached-{id}")).unwrap();
                None
            })
        });
        let events = output_log(&output);

        source_emitter.emit(1).unwrap();
        assert!(events.borrow().is_empty());

        queue.run_until_idle();
        assert_eq!(*events.borrow(), vec!["cached-1"]);
        assert!(output.is_active());
    }

    #[test]
    fn test_eager_child_emissions_before_subscribe_are_missed() {
        let (source, source_emitter) = parent();
        let output = source.chain(|id: &u32| {
            let id = *id;
            Progress::<String, String>::new(move |emitter| {
                emitter.emit(format!("cached-{id}")).unwrap();
                None
            })
        });
        let events = output_log(&output);

        source_emitter.emit(1).unwrap();

        assert!(events.borrow().is_empty());
        assert!(output.is_active());
    }

    #[test]
    fn test_deferred_chain_stop_stops_parent_and_child() {
        let queue = TurnQueue::new();
        let parent_torn_down = Rc::new(Cell::new(false));
        let flag = parent_torn_down.clone();
        let source: Progress<u32, String> = Progress::with_scheduler(queue.clone(), move |emitter| {
            emitter.emit(1).unwrap();
            Some(Box::new(move || flag.set(true)) as Cleanup)
        });
        let children: Slot = Rc::new(RefCell::new(Vec::new()));
        let stopped = Rc::new(Cell::new(0));
        let output = source.chain(manual_child(&children, &stopped));
        let events = output_log(&output);

        // The parent emits before the chain subscribes, so nothing spawns.
        queue.run_until_idle();
        assert!(children.borrow().is_empty());

        output.stop();
        queue.run_until_idle();

        assert!(parent_torn_down.get());
        assert_eq!(output.state(), ProgressState::Finished);
        assert_eq!(*events.borrow(), vec!["finish"]);
    }
}
