pub mod fingerprint;
pub mod guard;
pub mod reconciler;
pub mod scheduler;
pub mod transfer;

pub use fingerprint::{fingerprint_file, fingerprint_reader, Fingerprint};
pub use guard::{RunGuard, RunPermit, SingleFlight};
pub use reconciler::{
    AlwaysCopy, CompareThenCopy, Decision, DecisionPolicy, SyncOutcome, SyncPolicy, SyncRequest,
    TreeReconciler,
};
pub use scheduler::{ScheduleConfig, Scheduler, SchedulerState, TriggerOutcome, DEFAULT_COOLDOWN};
pub use transfer::copy_file;
