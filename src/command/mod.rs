//! Running the external tools every backup step is delegated to.
//!
//! An [Invocation] describes a single subprocess: program, arguments,
//! environment and where its standard output should end up. A [Runner]
//! executes it. [SystemRunner] spawns real processes, [DryRunRunner] only
//! reports what would be spawned.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::thread;

use derive_more::{Display, Error};

const PASSWORD_ARG: &str = "--password=";
const MASK: &str = "***";

/// A subprocess to be run by a [Runner].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the subprocess only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Writes the standard output of the subprocess to `path` instead of
    /// relaying it to the output sink of the [Runner].
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Short name of the program, used in messages.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// The arguments exactly as the subprocess receives them.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn stdout_path(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }

    /// The arguments with secrets masked, safe for logs.
    pub fn redacted_arguments(&self) -> Vec<Cow<'_, str>> {
        self.args.iter().map(|arg| redact_arg(arg)).collect()
    }
}

/// Renders the invocation as a shell-like line with every secret masked.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.envs {
            write!(f, "{key}={} ", redact_env(key, value))?;
        }
        write!(f, "{}", self.program.display())?;
        for arg in self.redacted_arguments() {
            write!(f, " {arg}")?;
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {}", stdout.display())?;
        }
        Ok(())
    }
}

/// Masks the value of a `--password=<secret>` argument.
pub fn redact_arg(arg: &str) -> Cow<'_, str> {
    if arg.starts_with(PASSWORD_ARG) {
        Cow::Owned(format!("{PASSWORD_ARG}{MASK}"))
    } else {
        Cow::Borrowed(arg)
    }
}

/// Masks the value of environment variables carrying a password, e.g. `PGPASSWORD`.
pub fn redact_env<'a>(key: &str, value: &'a str) -> &'a str {
    if key.to_ascii_uppercase().contains("PASSWORD") {
        MASK
    } else {
        value
    }
}

/// Errors on locating or running an external tool.
#[derive(Debug, Display, Error)]
pub enum CommandError {
    /// The program is not installed or not on `PATH`.
    #[display("{program} not found in PATH: {source}")]
    NotFound {
        program: String,
        source: which::Error,
    },
    /// Creating the file receiving the standard output failed.
    #[display("creating output file {} for {program} failed: {source}", path.display())]
    OutputFile {
        program: String,
        path: PathBuf,
        source: io::Error,
    },
    /// The subprocess could not be started.
    #[display("starting {program} failed: {source}")]
    Spawn { program: String, source: io::Error },
    /// Relaying the output of the subprocess failed.
    #[display("relaying output of {program} failed: {source}")]
    Relay { program: String, source: io::Error },
    /// The subprocess exited unsuccessfully.
    #[display("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Looks up `program` on `PATH`.
pub fn locate(program: &str) -> Result<PathBuf, CommandError> {
    which::which(program).map_err(|source| CommandError::NotFound {
        program: program.to_string(),
        source,
    })
}

/// Executes [Invocation]s.
pub trait Runner {
    /// Resolves a program name to the binary to run.
    fn locate(&self, program: &str) -> Result<PathBuf, CommandError> {
        locate(program)
    }

    /// Runs `invocation` to completion.
    ///
    /// Standard error, and standard output unless redirected with
    /// [Invocation::stdout_to], are written to `output`.
    fn run(&self, invocation: &Invocation, output: &mut (dyn Write + Send))
        -> Result<(), CommandError>;
}

/// Spawns real subprocesses and waits for them.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(
        &self,
        invocation: &Invocation,
        output: &mut (dyn Write + Send),
    ) -> Result<(), CommandError> {
        let program = invocation.name();
        log::debug!(target: "command", "Running: {invocation}");

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arguments())
            .envs(invocation.envs().iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stderr(Stdio::piped());

        match invocation.stdout_path() {
            Some(path) => {
                let file = File::create(path).map_err(|source| CommandError::OutputFile {
                    program: program.clone(),
                    path: path.to_path_buf(),
                    source,
                })?;
                command.stdout(file);
            }
            None => {
                command.stdout(Stdio::piped());
            }
        }

        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = Mutex::new(output);

        // both pipes are drained at once, a full pipe would block the child
        let relayed = thread::scope(|scope| {
            let sink = &sink;
            let stderr_pump = stderr.map(|stderr| scope.spawn(move || pump(stderr, sink)));
            let stdout_res = stdout.map_or(Ok(()), |stdout| pump(stdout, sink));
            let stderr_res = match stderr_pump {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stderr relay panicked"))),
                None => Ok(()),
            };
            stdout_res.and(stderr_res)
        });

        let status = child.wait().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;
        relayed.map_err(|source| CommandError::Relay {
            program: program.clone(),
            source,
        })?;

        if !status.success() {
            return Err(CommandError::Failed { program, status });
        }
        log::trace!(target: "command", "{program} finished successfully");

        Ok(())
    }
}

fn pump(mut source: impl Read, sink: &Mutex<&mut (dyn Write + Send)>) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let read = match source.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let mut sink = sink
            .lock()
            .map_err(|_| io::Error::other("output sink poisoned"))?;
        sink.write_all(&buf[..read])?;
        sink.flush()?;
    }
}

/// Prints invocations instead of running them.
///
/// Programs missing on `PATH` resolve to their bare name, so a dry run works
/// on machines without the database tools installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

impl Runner for DryRunRunner {
    fn locate(&self, program: &str) -> Result<PathBuf, CommandError> {
        Ok(locate(program).unwrap_or_else(|_| PathBuf::from(program)))
    }

    fn run(
        &self,
        invocation: &Invocation,
        output: &mut (dyn Write + Send),
    ) -> Result<(), CommandError> {
        log::warn!(target: "command", "Dry run, not executing: {invocation}");
        writeln!(output, "dry-run: {invocation}").map_err(|source| CommandError::Relay {
            program: invocation.name(),
            source,
        })
    }
}
