//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for the VisitQ engine. Every method
//! takes the caller's `actor` alongside its parameters and returns the
//! post-transition snapshot.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
