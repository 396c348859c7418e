use super::{utils::command::create_command, Action, ActionError};
use crate::{application::StepSpec, context::Context};
use duct::Handle;
use duration_string::DurationString;
use log::{debug, error, info, warn};
use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom},
    path::PathBuf,
    process::ExitStatus,
    thread::sleep,
    time::{Duration, Instant},
};
use thiserror::Error;

const ACTION_NAME: &str = "STEPS";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The name of the file collecting the output of the running step, next to the working copy.
pub const OUTPUT_FILE_NAME: &str = ".output";

/// An action to run the steps of an application in order, inside its working copy.
///
/// If any step fails, the remaining steps are skipped and the whole list restarts from the
/// first step, until one attempt completes without failures. The number of attempts can be
/// limited (otherwise a step that always fails blocks forever) and every step can be killed
/// after a timeout, together with every process it started.
///
/// The stdout and stderr of each step are written to an output file and logged after the
/// step finished. A file is used instead of a pipe, so background processes started by a
/// step (e.g. `server &`) do not keep the step running.
pub struct StepsAction {
    app_name: String,
    directory: PathBuf,
    output: PathBuf,
    steps: Vec<StepSpec>,
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
}

/// Custom error describing the error cases for the StepsAction.
#[derive(Debug, Error)]
pub enum StepError {
    /// The underlying Rust command creation failed. The parameter contains the error.
    #[error("the step cannot run: {0}")]
    StepFailure(#[from] std::io::Error),
    /// The step returned a non-zero exit code. The parameters are the exit code and the output.
    #[error("the step returned non-zero exit code {0}")]
    NonZeroExitcode(i32, String),
    /// The step did not finish in time and it was killed.
    #[error("the step did not finish in {0}")]
    TimedOut(DurationString),
    /// The command line cannot be split into arguments, this won't get better by retrying.
    #[error("the command {0:?} cannot be parsed")]
    InvalidCommand(String),
    /// Every attempt failed.
    #[error("the steps failed {0} times in a row, giving up until the next commit")]
    AttemptsExhausted(u32),
}

impl From<StepError> for ActionError {
    fn from(value: StepError) -> Self {
        ActionError::FailedAction(value.to_string())
    }
}

/// Kill the process group of the step, so the processes it started in the foreground
/// or in the background do not outlive it.
fn kill(handle: &Handle) -> Result<(), StepError> {
    #[cfg(unix)]
    {
        use nix::{
            sys::signal::{killpg, Signal},
            unistd::Pid,
        };
        for pid in handle.pids() {
            // The group can be empty already
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }
    handle.kill()?;

    Ok(())
}

impl StepsAction {
    /// Creates a new list of steps to be run in the given directory, collecting the output
    /// of the steps in the given file.
    pub fn new(
        app_name: String,
        directory: PathBuf,
        output: PathBuf,
        steps: Vec<StepSpec>,
        max_attempts: Option<u32>,
        timeout: Option<Duration>,
    ) -> Self {
        StepsAction {
            app_name,
            directory,
            output,
            steps,
            max_attempts,
            timeout,
        }
    }

    fn wait(&self, handle: &Handle) -> Result<ExitStatus, StepError> {
        let Some(timeout) = self.timeout else {
            return Ok(handle.wait()?.status);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(output) = handle.try_wait()? {
                return Ok(output.status);
            }
            if Instant::now() >= deadline {
                kill(handle)?;
                return Err(StepError::TimedOut(DurationString::new(timeout)));
            }
            sleep(POLL_INTERVAL);
        }
    }

    /// Open the output file for appending and return it with the position where the step starts.
    fn open_output(&self) -> Result<(File, u64), StepError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output)?;
        let offset = file.metadata()?.len();

        Ok((file, offset))
    }

    fn read_output(&self, offset: u64) -> Result<String, StepError> {
        let mut file = File::open(&self.output)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        Ok(String::from_utf8_lossy(&buffer).trim_end().to_string())
    }

    /// Run one step and return its output, or `None` if it had nothing to run.
    fn run_step(&self, step: &StepSpec, context: &Context) -> Result<Option<String>, StepError> {
        let Some((program, mut expression)) =
            create_command(&step.command, &self.directory).map_err(StepError::InvalidCommand)?
        else {
            return Ok(None);
        };
        debug!(
            "[{}] Running {program} in directory {}.",
            self.app_name,
            self.directory.display()
        );

        expression = expression
            .env("CI", "true")
            .env("AUTOCC_ACTION_NAME", ACTION_NAME)
            .env("AUTOCC_APP_NAME", &self.app_name)
            .env("AUTOCC_STEP_NAME", &step.name)
            .env("AUTOCC_DIRECTORY", &self.directory);
        for (key, value) in context {
            expression = expression.env(format!("AUTOCC_{key}"), value);
        }

        let (output_file, offset) = self.open_output()?;
        expression = expression
            .stderr_to_stdout()
            .stdout_file(output_file)
            .unchecked();
        #[cfg(unix)]
        {
            expression = expression.before_spawn(|command| {
                use std::os::unix::process::CommandExt;
                command.process_group(0);
                Ok(())
            });
        }

        let handle = expression.start()?;
        let status = self.wait(&handle);
        let output = self.read_output(offset)?;
        let status = status?;

        if status.success() {
            Ok(Some(output))
        } else {
            Err(StepError::NonZeroExitcode(status.code().unwrap_or(-1), output))
        }
    }

    fn run_attempt(&self, context: &Context) -> Result<(), StepError> {
        let app_name = &self.app_name;
        for step in &self.steps {
            let step_name = &step.name;
            info!("[{app_name}] Executing step: {step_name}");

            match self.run_step(step, context) {
                Ok(Some(output)) => {
                    output.lines().for_each(|line| {
                        info!("[{app_name}] [{step_name}] {line}");
                    });
                }
                Ok(None) => {
                    warn!("[{app_name}] Step {step_name} has no command, skipping.");
                }
                Err(err) => {
                    error!("[{app_name}] Step {step_name} failed: {err}.");
                    if let StepError::NonZeroExitcode(_, output) = &err {
                        output.lines().for_each(|line| {
                            error!("[{app_name}] [{step_name}] {line}");
                        });
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn run_inner(&self, context: &Context) -> Result<(), StepError> {
        let app_name = &self.app_name;
        if self.steps.is_empty() {
            debug!("[{app_name}] There are no steps to run.");
            return Ok(());
        }
        // Start a new output file for every run
        fs::write(&self.output, "")?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.run_attempt(context) {
                Ok(()) => {
                    info!("[{app_name}] All steps finished successfully.");
                    return Ok(());
                }
                Err(err @ StepError::InvalidCommand(_)) => return Err(err),
                Err(_) => {
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(StepError::AttemptsExhausted(attempt));
                    }
                    warn!("[{app_name}] Restarting steps due to failure (attempt {attempt} failed).");
                }
            }
        }
    }
}

impl Action for StepsAction {
    /// Run the steps in order. If a step fails, restart from the first step until every
    /// step succeeds in the same attempt or the attempts run out.
    fn run(&self, context: &Context) -> Result<(), ActionError> {
        match self.run_inner(context) {
            Ok(()) => Ok(()),
            Err(err) => {
                error!("[{}] Failed: {err}.", self.app_name);
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::StepCommand,
        test_utils::{cleanup_directory, create_test_directory},
    };
    use std::{collections::HashMap, error::Error, path::Path, sync::mpsc, thread};

    fn exec(name: &str, executable: &str, args: &[&str]) -> StepSpec {
        StepSpec {
            name: String::from(name),
            command: StepCommand::Exec {
                executable: String::from(executable),
                args: args.iter().map(|arg| arg.to_string()).collect(),
            },
        }
    }

    fn line(name: &str, command: &str, shell: bool) -> StepSpec {
        StepSpec {
            name: String::from(name),
            command: StepCommand::Line {
                command: String::from(command),
                shell,
            },
        }
    }

    fn append(name: &str, text: &str) -> StepSpec {
        let script = format!("echo {text} >> runs.log");
        exec(name, "sh", &["-c", script.as_str()])
    }

    fn create_action(
        directory: &str,
        steps: Vec<StepSpec>,
        max_attempts: Option<u32>,
    ) -> StepsAction {
        create_action_with_timeout(directory, steps, max_attempts, Duration::from_secs(10))
    }

    fn create_action_with_timeout(
        directory: &str,
        steps: Vec<StepSpec>,
        max_attempts: Option<u32>,
        timeout: Duration,
    ) -> StepsAction {
        StepsAction::new(
            String::from("test"),
            PathBuf::from(directory),
            PathBuf::from(format!("{directory}/{OUTPUT_FILE_NAME}")),
            steps,
            max_attempts,
            Some(timeout),
        )
    }

    #[test]
    fn it_should_run_the_steps_in_order() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action(
            &directory,
            vec![append("first", "1"), append("second", "2"), append("third", "3")],
            Some(1),
        );
        action.run_inner(&HashMap::new())?;

        assert_eq!("1\n2\n3\n", fs::read_to_string(format!("{directory}/runs.log"))?);

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_not_run_anything_without_steps() -> Result<(), Box<dyn Error>> {
        // The directory does not exist, so spawning any process would fail
        let action = create_action("/path/to/nowhere", vec![], Some(1));

        action.run_inner(&HashMap::new())?;

        Ok(())
    }

    #[test]
    fn it_should_restart_from_the_first_step() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action(
            &directory,
            vec![
                append("first", "1"),
                exec("second", "false", &[]),
                append("third", "3"),
            ],
            Some(3),
        );
        let result = action.run_inner(&HashMap::new());

        assert!(
            matches!(result, Err(StepError::AttemptsExhausted(3))),
            "{result:?} should be AttemptsExhausted"
        );
        assert_eq!("1\n1\n1\n", fs::read_to_string(format!("{directory}/runs.log"))?);

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_finish_after_a_failure_is_fixed() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action(
            &directory,
            vec![
                append("first", "1"),
                line(
                    "flaky",
                    "test -f failed-once || { touch failed-once; exit 1; }",
                    true,
                ),
                append("third", "3"),
            ],
            Some(3),
        );
        action.run_inner(&HashMap::new())?;

        assert_eq!("1\n1\n3\n", fs::read_to_string(format!("{directory}/runs.log"))?);

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_retry_forever_without_a_limit() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        // The second step fails until the stop file is created
        let action = create_action(
            &directory,
            vec![
                append("first", "1"),
                exec("second", "sh", &["-c", "test -f stop || { sleep 0.1; exit 1; }"]),
                append("third", "3"),
            ],
            None,
        );
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = action.run_inner(&HashMap::new());
            let _ = tx.send(result.is_ok());
        });

        let result = rx.recv_timeout(Duration::from_secs(2));
        assert!(result.is_err(), "{result:?} should not finish");

        let runs = fs::read_to_string(format!("{directory}/runs.log"))?;
        assert!(runs.lines().count() >= 2, "{runs:?} should be restarted");
        assert!(runs.lines().all(|line| line == "1"));

        // Only a succeeding attempt ends the loop
        fs::write(format!("{directory}/stop"), "")?;
        assert!(rx.recv_timeout(Duration::from_secs(5))?);
        let runs = fs::read_to_string(format!("{directory}/runs.log"))?;
        assert_eq!(Some("3"), runs.lines().last());

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_kill_the_step_after_the_timeout() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action_with_timeout(
            &directory,
            vec![exec("slow", "sleep", &["10"])],
            Some(1),
            Duration::from_millis(200),
        );
        let start = Instant::now();
        let result = action.run_step(&action.steps[0], &HashMap::new());

        assert!(
            matches!(result, Err(StepError::TimedOut(_))),
            "{result:?} should be TimedOut"
        );
        assert!(start.elapsed() < Duration::from_secs(5));

        let result = action.run_inner(&HashMap::new());
        assert!(
            matches!(result, Err(StepError::AttemptsExhausted(1))),
            "{result:?} should be AttemptsExhausted"
        );

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn it_should_kill_every_process_of_a_timed_out_step() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action_with_timeout(
            &directory,
            vec![line(
                "nested",
                "(sleep 1; echo late >> late.log); echo done",
                true,
            )],
            Some(1),
            Duration::from_millis(200),
        );
        let result = action.run_inner(&HashMap::new());

        assert!(
            matches!(result, Err(StepError::AttemptsExhausted(1))),
            "{result:?} should be AttemptsExhausted"
        );

        // The subshell was killed with the step, it never writes
        thread::sleep(Duration::from_millis(1500));
        assert!(!Path::new(&format!("{directory}/late.log")).exists());

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_not_wait_for_background_processes() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action_with_timeout(
            &directory,
            vec![line("server", "sleep 3 & echo started", true)],
            Some(1),
            Duration::from_secs(2),
        );
        let start = Instant::now();
        let output = action.run_step(&action.steps[0], &HashMap::new())?;

        assert_eq!(Some(String::from("started")), output);
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "{:?} should not wait for the background process",
            start.elapsed()
        );

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn it_should_run_scripts_relative_to_the_working_copy() -> Result<(), Box<dyn Error>> {
        use std::os::unix::fs::PermissionsExt;

        let directory = create_test_directory()?;
        let script = format!("{directory}/deploy.sh");
        fs::write(&script, "#!/bin/sh\necho deployed\n")?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

        let action = create_action(
            &directory,
            vec![
                line("line", "./deploy.sh", false),
                exec("exec", "./deploy.sh", &[]),
            ],
            Some(1),
        );
        for step in &action.steps {
            let output = action.run_step(step, &HashMap::new())?;
            assert_eq!(Some(String::from("deployed")), output, "{step:?}");
        }

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_not_retry_an_invalid_command() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action(
            &directory,
            vec![append("first", "1"), line("broken", "echo 'unclosed", false)],
            Some(5),
        );
        let result = action.run_inner(&HashMap::new());

        assert!(
            matches!(result, Err(StepError::InvalidCommand(_))),
            "{result:?} should be InvalidCommand"
        );
        assert_eq!("1\n", fs::read_to_string(format!("{directory}/runs.log"))?);

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_skip_empty_commands() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let action = create_action(
            &directory,
            vec![line("empty", "", false), append("first", "1")],
            Some(1),
        );
        action.run_inner(&HashMap::new())?;

        assert_eq!("1\n", fs::read_to_string(format!("{directory}/runs.log"))?);

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_catch_error_output() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;
        let action = create_action(&directory, vec![line("err", "echo err >&2", true)], Some(1));

        let output = action.run_step(&action.steps[0], &HashMap::new())?;
        assert_eq!(Some(String::from("err")), output);

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_return_the_output_of_a_failed_step() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;
        let action = create_action(
            &directory,
            vec![
                line("ok", "echo fine", true),
                line("fail", "echo broken; exit 3", true),
            ],
            Some(1),
        );

        action.run_step(&action.steps[0], &HashMap::new())?;
        let result = action.run_step(&action.steps[1], &HashMap::new());
        // Only the output of the failed step is returned
        assert!(
            matches!(&result, Err(StepError::NonZeroExitcode(3, output)) if output == "broken"),
            "{result:?} should match non zero exit code"
        );

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_set_the_env_vars() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;
        let action = create_action(&directory, vec![line("env", "printenv", false)], Some(1));

        let context: Context = HashMap::from([
            ("TRIGGER_NAME", String::from("TEST-TRIGGER")),
            ("COMMIT_SHA", String::from("abcdef1234")),
        ]);
        let output = action.run_step(&action.steps[0], &context)?.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines.contains(&"CI=true"));
        assert!(lines.contains(&"AUTOCC_ACTION_NAME=STEPS"));
        assert!(lines.contains(&"AUTOCC_APP_NAME=test"));
        assert!(lines.contains(&"AUTOCC_STEP_NAME=env"));
        assert!(lines.contains(&format!("AUTOCC_DIRECTORY={directory}").as_str()));
        assert!(lines.contains(&"AUTOCC_TRIGGER_NAME=TEST-TRIGGER"));
        assert!(lines.contains(&"AUTOCC_COMMIT_SHA=abcdef1234"));
        // The environment of the daemon is inherited
        assert!(lines.iter().any(|line| line.starts_with("PATH=")));

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_log_the_output_with_the_app_and_step_name() -> Result<(), Box<dyn Error>> {
        testing_logger::setup();
        let directory = create_test_directory()?;
        let action = create_action(&directory, vec![line("greet", "echo hello", false)], Some(1));

        action.run(&HashMap::new())?;

        testing_logger::validate(|captured_logs| {
            assert!(captured_logs
                .iter()
                .any(|log| log.body == "[test] Executing step: greet"));
            assert!(captured_logs
                .iter()
                .any(|log| log.body == "[test] [greet] hello"));
        });

        cleanup_directory(&directory)?;

        Ok(())
    }
}
