mod aggregator;

pub use aggregator::ConsumerGroupAggregator;
