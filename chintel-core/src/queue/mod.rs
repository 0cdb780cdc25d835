//! In-process admission: sliding-window dedup and the bounded work queue.

mod dedup;
mod work_queue;

pub use dedup::{DEFAULT_DEDUP_WINDOW, DedupWindow, Fingerprint};
pub use work_queue::{QueueError, TaskHandle, WorkQueue};
