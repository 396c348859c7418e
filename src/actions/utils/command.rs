use crate::application::StepCommand;
use duct::{cmd, Expression};
use duct_sh::sh_dangerous;
use log::{trace, warn};
use std::path::{Path, PathBuf};

/// Returns true, if the command line looks like it was written for a shell (uses variables or pipes).
fn contains_shell_syntax(command: &str) -> bool {
    let contains_variables = command
        .find('$')
        .and_then(|pos| command[pos + 1..].chars().next())
        .map(|ch| ch.is_ascii_alphabetic() || ch == '{')
        == Some(true);

    let contains_suspicious =
        command.contains(" | ") || command.contains(" && ") || command.contains(" || ");

    contains_variables || contains_suspicious
}

/// Resolve a relative program path (e.g. `./deploy.sh`) inside the directory of the step.
///
/// duct resolves these from the current directory of the daemon, even if the child runs
/// in another one. Bare program names are left alone to be looked up in `PATH`.
fn resolve_program(program: &str, directory: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        directory.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Create the process expression of a step command, running in the given directory.
///
/// Returns `Ok(None)` if there is nothing to run, and `Err` with the original command line
/// if it cannot be split into arguments (e.g. it has unbalanced quotes).
pub fn create_command(
    command: &StepCommand,
    directory: &Path,
) -> Result<Option<(String, Expression)>, String> {
    match command {
        StepCommand::Exec { executable, args } => {
            if executable.trim().is_empty() {
                return Ok(None);
            }

            let script = cmd(resolve_program(executable, directory), args).dir(directory);
            trace!("Parsed {executable:?} {args:?} to {script:?}.");

            Ok(Some((executable.clone(), script)))
        }
        StepCommand::Line { command, shell } => {
            if !shell && contains_shell_syntax(command) {
                warn!("The command {command:?} contains a variable or other shell-specific character: you might want to run it in a shell (\"shell\": true).")
            }

            // We have to split the command into parts to get the command id
            let split_args = shlex::split(command).ok_or_else(|| command.clone())?;
            let Some((program, args)) = split_args.split_first() else {
                return Ok(None);
            };

            // Shell steps run as written, without escaping
            let script = if *shell {
                sh_dangerous(command)
            } else {
                cmd(resolve_program(program, directory), args)
            }
            .dir(directory);
            trace!("Parsed {command:?} to {script:?}.");

            Ok(Some((program.clone(), script)))
        }
    }
}
