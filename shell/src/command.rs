use crate::env::Environment;
use crate::error::ShellError;
use std::fs::File;
use std::process::{Child, ChildStdout, Stdio};

/// Conventional status code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

pub const SUCCESS: ExitCode = 0;
/// Status recorded by `exit`.
pub const EXIT: ExitCode = 1;
/// Status recorded when no factory recognizes a command name.
pub const UNKNOWN: ExitCode = 2;

/// What the prompt loop does after a line has been executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Source of a stage's standard input.
#[derive(Debug)]
pub enum StageInput {
    /// The shell's own standard input.
    Inherit,
    /// A file opened by `<`.
    File(File),
    /// Read end of the pipe written by the previous external stage.
    Upstream(ChildStdout),
    /// Output captured from a previous builtin stage.
    Buffered(Vec<u8>),
    /// Nothing; the previous stage redirected its output elsewhere.
    Empty,
}

impl StageInput {
    /// Convert into a [`Stdio`] for spawning.
    ///
    /// Buffered input becomes a pipe; the bytes are returned so the caller can
    /// write them once every stage of the pipeline is running.
    pub fn into_stdio(self) -> (Stdio, Option<Vec<u8>>) {
        match self {
            StageInput::Inherit => (Stdio::inherit(), None),
            StageInput::File(file) => (file.into(), None),
            StageInput::Upstream(pipe) => (pipe.into(), None),
            StageInput::Buffered(bytes) => (Stdio::piped(), Some(bytes)),
            StageInput::Empty => (Stdio::null(), None),
        }
    }
}

/// Destination of a stage's standard output.
#[derive(Debug)]
pub enum StageOutput {
    /// The shell's own standard output.
    Inherit,
    /// A file opened by `>` or `>>`.
    File(File),
    /// A pipe to the next stage.
    Pipe,
}

impl StageOutput {
    pub fn into_stdio(self) -> Stdio {
        match self {
            StageOutput::Inherit => Stdio::inherit(),
            StageOutput::File(file) => file.into(),
            StageOutput::Pipe => Stdio::piped(),
        }
    }
}

/// Result of starting one stage.
#[derive(Debug)]
pub enum Launch {
    /// The stage ran to completion inside the shell.
    ///
    /// `output` holds what it wrote when its output was a pipe.
    Finished {
        status: ExitCode,
        output: Option<Vec<u8>>,
    },
    /// The stage is a running child process.
    ///
    /// `feed` must be written to the child's stdin once the whole pipeline
    /// has been started.
    Spawned { child: Child, feed: Option<Vec<u8>> },
}

/// Object-safe trait for any command that can be started by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand {
    /// Start the command with the given standard streams.
    fn launch(
        self: Box<Self>,
        stdin: StageInput,
        stdout: StageOutput,
        env: &mut Environment,
    ) -> Result<Launch, ShellError>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
/// Implementations can use the environment to resolve executables.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;

    /// The single name this factory answers to, if it has a fixed one.
    fn command_name(&self) -> Option<&'static str> {
        None
    }
}
