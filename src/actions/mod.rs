use crate::context::Context;
use mockall::automock;
use thiserror::Error;

/// An action to run the steps of an application, restarting them on failure.
pub mod steps;
mod utils;

/// A custom error for describing the error cases for actions
#[derive(Debug, Error)]
pub enum ActionError {
    /// Running the action failed.
    #[error("{0}")]
    FailedAction(String),
}

/// An action is a process that runs if the check allows it.
///
/// Actions may include:
///   - running the steps of an application ([steps::StepsAction])
///   - etc.
#[automock]
pub trait Action: Send {
    /// Initiate the action
    fn run(&self, context: &Context) -> Result<(), ActionError>;
}
