//! Library crate for festival-back: festival lifecycle scheduling, progressive closing,
//! bulk purging and trigger deduplication, exposed for the server and tooling binaries.

pub mod clock;
pub mod config;
/// Festival and record persistence.
pub mod dao;
mod dto;
mod error;
/// HTTP routes.
pub mod routes;
/// Lifecycle, closing, purge and supporting services.
pub mod services;
/// Shared application state and lifecycle registries.
pub mod state;

#[cfg(test)]
mod test_support;
