//! # mdbmcp-server
//!
//! The MongoDB MCP server proper: the session–connection–tool dispatch
//! pipeline and its transports.
//!
//! ## Modules
//!
//! - `connection` - driver-handle state machine, OIDC co-flow
//! - `session` - per-client aggregate and event re-emission
//! - `tools` - tool trait, registry policy, dispatch pipeline, tool bodies
//! - `handler` - rmcp `ServerHandler` binding the pipeline to the protocol
//! - `transport` - stdio and streamable HTTP servers
//! - `exports` - background cursor→file exports as MCP resources
//! - `atlas` - typed Atlas Administration API client
//! - `telemetry` - buffered event emission
//! - `server` - process-wide assembly and per-session handler factory

pub mod atlas;
pub mod connection;
pub mod ejson;
pub mod exports;
pub mod handler;
pub mod logging;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod tools;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionSettings};
pub use handler::McpServerHandler;
pub use server::ServerContext;
pub use session::Session;
