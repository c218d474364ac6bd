mod probe;

pub use probe::{ProbeClient, ProbeError};
