//! Core domain types
//!
//! This module contains the core domain structures used across the winch
//! control plane. These types represent the fundamental business entities
//! shared between the persistence layer, the executor, and the HTTP API.

pub mod job;
pub mod log;
