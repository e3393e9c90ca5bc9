//! CLI command handlers. Each command is in its own file.

mod config;
mod get;
mod resume;
mod session;

pub use config::run_config;
pub use get::run_get;
pub use resume::run_resume;

#[cfg(test)]
pub(crate) use get::apply_overrides;
#[cfg(test)]
pub(crate) use session::snapshot_path;
