//! # tilecast-node: Capture Node
//!
//! Runs the tilecast capture pipeline against a synthetic camera: tile
//! change detection on a cooperative worker pool, region encoding for every
//! dirty region, and periodic throughput reports.
//!
//! Configuration comes from a TOML file (see [`config::NodeConfig`]);
//! `RUST_LOG` overrides the configured log level.

pub mod config;
pub mod node;
