//! JSON-RPC plumbing: the rate-limited endpoint pool and Multicall3
//! batch encoding.

pub mod endpoints;
pub mod multicall;

pub use endpoints::{CooldownClass, EndpointPool, RpcError};
