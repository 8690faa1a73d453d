//! Common library for the iLO fan panel
//!
//! This crate provides functionality shared across the workspace: environment
//! configuration helpers, the configuration error type and the Redis
//! connection backing shared login attempt counters.

pub mod cache;
pub mod config;
pub mod error;
