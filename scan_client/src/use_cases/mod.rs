pub mod consumer;
pub mod producer;

#[cfg(test)]
pub(crate) mod test_support;

pub use consumer::ConsumerAdapter;
pub use producer::{ProducerAdapter, RunOutcome, ScanMode};
