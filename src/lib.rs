#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rust_2018_idioms,
    unsafe_code
)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]
//! `tinykafka` is a lean async client for Kafka-compatible message broker
//! clusters. It speaks the binary wire protocol over a single connection per
//! broker ([`client::BrokerClient`]) and layers a batching, retrying producer
//! pipeline on top ([`client::producer::ProducerPipeline`]).

pub mod backoff;
mod build_info;
pub mod client;
mod connection;
pub mod messenger;
pub mod metadata;
pub mod protocol;
pub mod record;
mod throttle;

pub use connection::ConnectError;
pub type ProtocolError = protocol::error::Error;
