//! Tamperscope - Forensic analysis of MP4/MOV edits
//!
//! This library crate exposes the file pipeline behind the CLI for
//! integration testing.

pub mod analysis;
pub mod batch;
pub mod config;
pub mod extract;
pub mod report;
pub mod tools;
pub mod verify;
