pub mod governor;
pub mod platform_dirs;

pub use governor::{
    CommandResult, Diagnosis, GovernorConfig, GovernorError, GovernorResult, GovernorService,
    SecurityMode, WorkloadState,
};
