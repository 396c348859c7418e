//! Watch the remote git repositories of declared applications and run their build steps.
//!
//! ## How it works
//!
//! `autocc` is built up from **triggers**, a **scheduler** and per-application **pipelines**.
//! Triggers are long running background processes that initiate passes
//! (for example periodic triggers, file watchers or HTTP triggers). A pass reads every
//! application spec from the scripts directory and runs a pipeline for each of them
//! concurrently. A pipeline syncs the repository, checks whether the trigger branch
//! has a new commit and runs the declared steps if it has.
//!
//! ```ignore
//! +---------+       +-----------+       +------------------------------------+
//! | trigger | ----> | scheduler | ----> | pipeline: repository, check, steps |
//! +---------+       +-----------+       +------------------------------------+
//! ```
//!

/// An action is a process that runs if the check allows it (e.g. [running steps](actions::steps::StepsAction)).
pub mod actions;
/// The application specs, read from the scripts directory on every pass.
pub mod application;
/// A check decides whether the actions should run (e.g. [on new commits](checks::commit::CommitCheck)).
pub mod checks;
/// The context which can share data between the different stages.
pub mod context;
/// Thin wrapper around the `git` command line.
pub mod git;
/// The per-application composition of repository sync, check and actions.
pub mod pipeline;
/// A repository is a local working copy that can be synced with its remote.
pub mod repository;
/// A pass over every application spec, fanned out per application.
pub mod scheduler;
/// The global settings, loaded once at startup.
pub mod settings;
/// The main program loop, that runs the triggers and passes infinitely.
pub mod start;
/// A trigger is a long running background process, which initiates the passes
/// (e.g. [on a schedule](triggers::schedule::ScheduleTrigger), [on file changes](triggers::watch::WatchTrigger),
/// [on HTTP request](triggers::http::HttpTrigger) or [once](triggers::once::OnceTrigger)).
pub mod triggers;

#[cfg(test)]
mod test_utils;
