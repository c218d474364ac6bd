mod check;
mod checker;
mod notifier;
mod registry;
mod status;

pub use check::{check_fn, Check, CheckContext, CheckFn, StaticCheck};
pub use checker::{
    effective_deadline, BuildError, Checker, CheckerBuilder, ParallelMode, Snapshot,
    DEFAULT_TIMEOUT, PARALLEL_THRESHOLD,
};
pub use notifier::{notifier_fn, NopNotifier, Notifier, NotifierFn, TracingNotifier};
pub use registry::Registry;
pub use status::{status_code_for_repr, AtomicStatus, Status, Tally, INVALID_STATUS_CODE};
