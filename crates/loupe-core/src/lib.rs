//! Core infrastructure for loupe.
//!
//! This crate provides the server-agnostic building blocks:
//! - Position model with packed, hashable ranges
//! - Read-only view over the externally built symbol index
//! - Working-file table for open buffers
//! - Process-wide configuration and the highlight path filter

pub mod config;
pub mod index;
pub mod position;
pub mod working_files;
