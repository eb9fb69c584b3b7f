//! # Deskclaw Queue
//!
//! Capability-aware task queue for the desktop assistant. Workers (the local
//! agent runtime, or paired remote devices) pull tasks they are capable of
//! running; the queue owns the lifecycle: assignment, bounded retries,
//! deadline expiry, and terminal-state cleanup.
//!
//! ## Lifecycle
//! ```text
//! pending → assigned → running → {completed, failed}
//!    │          │          │
//!    └──────────┴──────────┴──→ cancelled
//! ```
//! `assigned → completed` is also legal (workers may skip the running
//! report). Terminal states absorb: transitions out of them return false.
//!
//! All mutations go through one mutex per queue instance — claim/assign
//! read-then-write task status and must not race. External work (the actual
//! LLM/tool call) always happens outside that lock.

pub mod queue;
pub mod store;
pub mod task;

pub use queue::{QueueStats, RetryPolicy, TaskQueue};
pub use store::QueueStore;
pub use task::{Task, TaskKind, TaskPriority, TaskStatus};
