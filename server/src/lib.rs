//! Realtime delivery server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod ingress;
pub mod proto;
pub mod registry;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod ws;
