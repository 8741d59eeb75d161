//! services/api/src/lib.rs
//!
//! Library root for the API service. The binaries and the integration tests
//! share the modules declared here.

pub mod adapters;
pub mod config;
pub mod error;
pub mod notify;
pub mod web;
