//! # shardgraph
//!
//! Command-line front end for the shardgraph loader: configuration loading
//! and the local cluster launcher.

pub mod cli;
pub mod config;
