// Inner modules
mod scheduler;

// Exports
pub use scheduler::TopicMetricsScheduler;
