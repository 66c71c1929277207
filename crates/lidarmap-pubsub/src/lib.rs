//! Lidarmap PubSub - topic messaging over WebSocket
//!
//! This crate provides:
//! - The binary frame codec shared by clients and the broker
//! - A reconnecting client with prefix-matched topic handlers
//! - A minimal broker for local setups and tests

pub mod broker;
pub mod client;
pub mod protocol;

pub use broker::{Broker, BoundBroker, BrokerError};
pub use client::{Address, ClientConfig, ClientError, Handler, PubSubClient};
pub use protocol::{Flag, Message, ProtocolError, decode, encode};
