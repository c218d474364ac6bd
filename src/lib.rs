// src/lib.rs
pub mod client;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;

pub use client::{ProbeClient, ProbeError};
pub use health::{Check, CheckContext, Checker, Notifier, Status};
