pub mod builder;
pub mod handler;
pub mod listener;

pub use builder::{serve_on, ServerBuilder};
pub use handler::{render, HealthHandler};
pub use listener::bind_tcp;
