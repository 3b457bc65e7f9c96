//! Bucketeer - Distributed Token-Bucket Rate Limiting
//!
//! This crate lets independent service instances enforce a shared per-key
//! quota without talking to each other. Every instance runs the token-bucket
//! step against one shared store, inside a transaction holding that key's
//! row lock, so decisions for a key are serialized across all instances.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod service;
pub mod store;
