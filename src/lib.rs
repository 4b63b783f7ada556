//! MCP server exposing Grafana Loki's read-only query API as agent tools.
//! `client` talks to Loki, `tools` validates and shapes results, `mcp` and
//! `http` carry JSON-RPC.

pub mod config;
pub mod error;
pub mod time;
pub mod model;
pub mod client;
pub mod format;
pub mod tools;
pub mod mcp;
pub mod http;
