//! Final agent command construction and handoff.

mod executor;

pub use executor::{
    build_command, exec_agent, write_dry_run_artifacts, DryRunArtifacts, ExecRequest,
};
