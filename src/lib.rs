//! Kubernetes MCP server.
//!
//! Wires the [`kms_mcp`] registry to Kubernetes: target providers backed by
//! kubeconfig contexts or the in-cluster service account, the `core` and
//! `config` toolsets, and the stdio and streamable HTTP transports.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod toolsets;
pub mod transport;
