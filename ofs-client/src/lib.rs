//! # ofs-client: OFS console client
//!
//! Reads commands from stdin, issues them through an
//! [`ofs_core::Coordinator`], and prints every server message and
//! connection event as it arrives.

pub mod config;
pub mod console;
