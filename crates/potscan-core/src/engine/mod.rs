//! # Engine Module
//!
//! The stateful layer between the core building blocks and the workflows.
//!
//! - **System** ([`system`]) - A molecular system with its attached potentials,
//!   evaluated frame by frame
//! - **Configuration** ([`config`]) - Validated run settings and potential descriptions
//! - **Progress Monitoring** ([`progress`]) - Events reported to front ends
//! - **Error Handling** ([`error`]) - Engine-level error type

pub mod config;
pub mod error;
pub mod progress;
pub mod system;
