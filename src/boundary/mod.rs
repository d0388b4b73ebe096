//! Host-facing operation boundary.
//!
//! # Data Flow
//! ```text
//! host call ──→ *_async(…, Completion<T>) ──→ engine task
//!                                                 │
//!               on_success(T) | on_error(Reason) ←┘   (exactly once)
//!
//! timeout::channel(op) → (Completion<T>, PendingOutcome<T>)
//!     → PendingOutcome::wait(limit) for hosts that block with a deadline
//! ```

pub mod completion;
pub mod timeout;

pub use completion::Completion;
pub use timeout::{channel, PendingOutcome};
