//! The wrapped Fastly REST API.
//!
//! [`kafka`] holds the request/response shapes, [`client`] the [`FastlyApi`]
//! trait and its `reqwest` implementation.

pub mod client;
#[allow(missing_docs)]
pub mod kafka;

pub use client::{FastlyApi, FastlyClient};
pub use kafka::{
    Compatibool, CreateKafkaInput, DeleteKafkaInput, Kafka, KafkaFields, ListKafkasInput,
    UpdateKafkaInput,
};
