pub mod convergence_detector;
pub mod event_bus;
pub mod orchestrator;
pub mod scorer;
pub mod shadow_controller;
pub mod tracker;
pub mod weight_store;

pub use convergence_detector::ConvergenceDetector;
pub use event_bus::{EventBus, EventBusConfig};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use scorer::{FeedbackSample, ResultCache, Scorer, WeightOptimizer};
pub use shadow_controller::{is_sampled, sampling_hash, ShadowController};
pub use tracker::{TrackedResult, Tracker};
pub use weight_store::{WeightSnapshot, WeightStore};
