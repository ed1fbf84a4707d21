//! Tick drivers for the pipeline: a wall-clock interval loop for the daemon
//! and a virtual-clock replay for offline runs.

pub mod engine;

pub use self::engine::{replay, run_pipeline_loop};
