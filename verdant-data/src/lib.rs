//! Synchronization engine and backends for the Verdant pipeline.
//!
//! Responsibilities:
//! - Implement the remote table service wire protocol behind a transport
//!   trait so the engine is testable without a network.
//! - Provide the synchronization primitives: exhaustive paginated fetch,
//!   memoised linked-record resolution, paced batch upload, and bounded
//!   trigger-and-verify table clearing.
//! - Wire those primitives into the [`verdant_core::DataAdapter`] contract,
//!   alongside the thin collaborator modules for configuration, attachment
//!   mirroring, and observation derivation.
//!
//! Boundaries:
//! - Domain value types live in `verdant-core`.
//! - Keep blocking I/O off async executors; prefer async-capable clients.

#![forbid(unsafe_code)]

pub mod airtable;
pub mod attachments;
pub mod backend;
pub mod config;
pub mod observations;
