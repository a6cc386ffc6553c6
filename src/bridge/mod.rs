//! Cross-loop handoff subsystem.
//!
//! # Data Flow
//! ```text
//! Front loop (request task)                 Back runtime workers
//!     submit(work, completion) ───────────▶ work() runs, may block
//!                                           │
//!     WakeQueue::next() ◀── FrontWaker::post(completion(ctx, output))
//!     completion(ctx, output)
//!     driver re-drives the request
//! ```
//!
//! # Design Decisions
//! - Submission fails synchronously (saturated / closed); a request is never
//!   left suspended on a job that will not run
//! - Completions reach the front loop through the request's own queue, so
//!   they are ordered with the backend callbacks posted to the same queue

pub mod wake;
pub mod worker;

pub use wake::{wake_channel, Continuation, FrontWaker, WakeQueue};
pub use worker::CrossLoopBridge;
