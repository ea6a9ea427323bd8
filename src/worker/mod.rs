//! Supervision of external inference worker processes.
//!
//! The supervisor owns the fan-out/fan-in stage of a job: one worker
//! process per non-empty partition, each pinned to its GPU, with the
//! combined output streamed into the log and a wait-for-all join before
//! the aggregate verdict is evaluated.

pub mod supervisor;

pub use supervisor::{WorkerSpec, WorkerSupervisor};
