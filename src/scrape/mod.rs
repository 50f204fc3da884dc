mod coordinator;
mod pipeline;

pub use coordinator::ScrapeCoordinator;
pub use pipeline::{ScrapeConfig, ScrapePipeline};
