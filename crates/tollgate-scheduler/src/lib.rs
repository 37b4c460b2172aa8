//! Change-gated matrix orchestration for Tollgate.
//!
//! A run expands the matrix into job instances, wires every gated instance
//! behind the change detector, records the detector's decision in a
//! run-scoped store, and lets each instance skip or proceed on its own.

pub mod cancel;
pub mod dag;
pub mod detector;
pub mod events;
pub mod gate;
pub mod matrix;
pub mod patterns;
pub mod scheduler;
pub mod store;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use dag::{GatePolicy, GraphNode, JobGraph};
pub use detector::ChangeDetector;
pub use events::{BroadcastEventBus, RecordingEventBus};
pub use gate::{GateVerdict, JobGate};
pub use matrix::{JobInstance, MatrixExpander, MatrixExpansion};
pub use patterns::{PathPattern, PatternSet};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{FileDecisionStore, InMemoryDecisionStore};
