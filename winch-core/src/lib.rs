//! Winch Core
//!
//! Core types and abstractions for the winch control plane.
//!
//! This crate contains:
//! - Domain types: Core business entities (Job, LogEntry)
//! - DTOs: Data transfer objects consumed by the HTTP API
//! - Redaction: credential scrubbing applied to captured output lines

pub mod domain;
pub mod dto;
pub mod redact;
