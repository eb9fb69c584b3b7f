//! # Deskclaw Scheduler
//!
//! Recurring-prompt scheduler for the desktop assistant.
//! Optimized for file-based state and fast cold start.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval tick)
//!   ├── CronExpression: "0 9 * * *" → next_after(now)
//!   ├── ScheduleStore: one JSON record file per schedule
//!   ├── on due → ScheduleExecutor.execute(prompt, agent)
//!   └── ExecutionRecord history (bounded, newest first)
//! ```
//!
//! The engine never interprets executor output beyond success/failure;
//! the LLM/tool-calling side lives behind the [`ScheduleExecutor`] trait.

pub mod cron;
pub mod engine;
pub mod entry;
pub mod store;

pub use cron::{CronExpression, CronField};
pub use engine::{ScheduleExecutor, SchedulerEngine};
pub use entry::{ExecutionRecord, RunStatus, ScheduleEntry, ScheduleUpdate};
pub use store::ScheduleStore;
