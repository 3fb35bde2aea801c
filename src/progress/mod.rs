// file: src/progress/mod.rs
// description: progress module exports and public api
// reference: multi-emission asynchronous value primitive

mod adapters;
mod chain;
mod controller;
mod stream;
mod listeners;
pub mod scheduler;

pub use stream::{Emitter, Progress, ProgressState};
pub use controller::ProgressController;
pub use listeners::{Cleanup, HookRemover, Listeners, Subscription, SubscriptionId};
pub use scheduler::{Immediate, LocalSpawner, Scheduler, Task, TurnQueue};
