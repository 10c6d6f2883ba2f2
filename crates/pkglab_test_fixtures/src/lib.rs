mod consumer;
mod producer;

pub use consumer::FakeConsumer;
pub use producer::{FakeProducer, FakeProducerBuilder};
