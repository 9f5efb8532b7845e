//! Event ingestion: decoding and the debounced fan-out bus.

pub mod bus;
pub mod decoder;

pub use bus::{BusConfig, BusStats, EventBus};
pub use decoder::{ChainEvent, DecodeError, PoolEvent, RawLog};
