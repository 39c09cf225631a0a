use crate::command::{
    CommandFactory, ExecutableCommand, ExitCode, Flow, Launch, StageInput, StageOutput, SUCCESS,
    UNKNOWN,
};
use crate::complete::{self, Completion};
use crate::config::{Config, SYSNAME};
use crate::env::Environment;
use crate::error::{InputError, ShellError};
use crate::external::exit_code;
use crate::input::{COMPLETION_MARKER, Input, LineReader};
use crate::parser::{self, Pipeline, RedirectKind, Stage};
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::process::{Child, ChildStdin};
use tracing::{debug, warn};

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: builtins and `ExternalCommand`.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Children of a pipeline started with `&`.
struct Job {
    /// Process id of the last stage, used to name the job.
    pid: u32,
    command: String,
    children: Vec<Child>,
    status: Option<ExitCode>,
}

/// An interactive shell that executes parsed pipelines of built-in and external commands.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried, in order, to create commands by name. See
/// [`Interpreter::with_default_commands`] for the factories included out of the box.
///
/// Example
/// ```no_run
/// use seashell::{Config, Interpreter};
/// let mut sh = Interpreter::with_default_commands(Config::from_process().unwrap());
/// sh.execute_line("echo hello | tr a-z A-Z");
/// assert_eq!(sh.last_status(), 0);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    jobs: Vec<Job>,
    last_status: ExitCode,
    hostname: String,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(config: Config, commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(config),
            commands,
            jobs: Vec::new(),
            last_status: SUCCESS,
            hostname: hostname(),
        }
    }

    /// Create an interpreter with the default set of commands:
    /// - built-ins: `cd`, `exit`, `shortdir`, `highlight`, `goodMorning`, `kdiff`, `concatenate`
    /// - external command launcher
    pub fn with_default_commands(config: Config) -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(
            config,
            vec![
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<ShortDir>::default()),
                Box::new(Factory::<Highlight>::default()),
                Box::new(Factory::<GoodMorning>::default()),
                Box::new(Factory::<KDiff>::default()),
                Box::new(Factory::<Concatenate>::default()),
                Box::new(Factory::<ExternalCommand>::default()),
            ],
        )
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Status of the most recently executed pipeline.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Number of background pipelines that haven't been reaped yet.
    pub fn background_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// `user@host:cwd seashell$ `
    pub fn prompt(&self) -> String {
        format!(
            "{}@{}:{} {}$ ",
            self.env.get_var("USER").unwrap_or_default(),
            self.hostname,
            self.env.current_dir.display(),
            SYSNAME
        )
    }

    /// Parse and execute one line, reporting parse errors.
    pub fn execute_line(&mut self, line: &str) -> Flow {
        match parser::parse(line) {
            Ok(pipeline) => self.execute(&pipeline),
            Err(err) => {
                eprintln!("-{}: {}", SYSNAME, ShellError::from(err));
                self.last_status = 1;
                Flow::Continue
            }
        }
    }

    /// Execute a parsed pipeline.
    ///
    /// Failures are reported on stderr and recorded in [`Interpreter::last_status`];
    /// only `exit` makes this return [`Flow::Terminate`]. Completion requests
    /// and blank lines do nothing.
    pub fn execute(&mut self, pipeline: &Pipeline) -> Flow {
        if pipeline.is_noop() || pipeline.auto_complete {
            return Flow::Continue;
        }

        debug!(%pipeline, background = pipeline.background, "executing");
        self.last_status = match self.run_pipeline(pipeline) {
            Ok(status) => status,
            Err(err) => {
                eprintln!("-{}: {}", SYSNAME, err);
                match err {
                    ShellError::CommandNotFound(_) => UNKNOWN,
                    _ => 1,
                }
            }
        };

        if self.env.should_exit {
            Flow::Terminate
        } else {
            Flow::Continue
        }
    }

    /// Complete the last word of a line ended by Tab, printing the candidates
    /// when there is more than one.
    pub fn complete(&self, line: &str) -> Completion {
        let text = line.trim_end();
        let text = text.strip_suffix(COMPLETION_MARKER).unwrap_or(text);
        let names: Vec<&str> = self
            .commands
            .iter()
            .filter_map(|factory| factory.command_name())
            .collect();

        let completion = complete::complete(
            text,
            &names,
            &self.env.config.bin_dir,
            &self.env.current_dir,
        );
        if completion.candidates.len() > 1 {
            println!("{}", completion.candidates.join("  "));
        }
        completion
    }

    /// Report and forget background pipelines whose processes have all exited.
    pub fn reap_background(&mut self) {
        self.jobs.retain_mut(|job| {
            job.children.retain_mut(|child| match child.try_wait() {
                Ok(Some(exit)) => {
                    if child.id() == job.pid {
                        job.status = Some(exit_code(exit));
                    }
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    warn!(pid = child.id(), error = %e, "can't poll background child");
                    false
                }
            });
            if !job.children.is_empty() {
                return true;
            }

            let status = job.status.unwrap_or_default();
            debug!(pid = job.pid, status, command = %job.command, "background job finished");
            println!("[{}] done ({})", job.pid, status);
            false
        });
    }

    /// Prompt, read, execute until `exit` or end of input.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut reader = LineReader::new(self.env.config.max_line_len);
        let mut pending = String::new();

        loop {
            self.reap_background();

            let mut stdout = io::stdout();
            write!(stdout, "{}", self.prompt())?;
            stdout.flush()?;

            let line = match reader.read_from_terminal(&pending) {
                Ok(Input::Line(line)) => line,
                Ok(Input::Eof) => break,
                Err(err @ InputError::LineTooLong { .. }) => {
                    eprintln!("-{}: {}", SYSNAME, err);
                    pending.clear();
                    continue;
                }
                Err(err) => return Err(err).context("can't read from the terminal"),
            };
            pending.clear();

            if self.dispatch(&line, &mut pending) == Flow::Terminate {
                break;
            }
        }

        println!();
        Ok(())
    }

    /// Handle one line read at the prompt. A line ended by Tab is completed
    /// without being parsed, so unfinished input like `ls |` still completes;
    /// the result is left in `pending` to seed the next read.
    fn dispatch(&mut self, line: &str, pending: &mut String) -> Flow {
        if line.trim_end().ends_with(COMPLETION_MARKER) {
            *pending = self.complete(line).line;
            return Flow::Continue;
        }
        self.execute_line(line)
    }

    fn resolve(&self, stage: &Stage) -> Result<Box<dyn ExecutableCommand>, ShellError> {
        let args: Vec<&str> = stage.arguments.iter().map(String::as_str).collect();
        self.commands
            .iter()
            .find_map(|factory| factory.try_create(&self.env, &stage.name, &args))
            .ok_or_else(|| ShellError::CommandNotFound(stage.name.clone()))
    }

    fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<ExitCode, ShellError> {
        let commands = pipeline
            .stages()
            .iter()
            .map(|stage| self.resolve(stage))
            .collect::<Result<Vec<_>, _>>()?;

        let mut children: Vec<Child> = Vec::new();
        let mut feeds: Vec<(Option<ChildStdin>, Vec<u8>)> = Vec::new();
        let mut upstream = StageInput::Inherit;
        let mut status = SUCCESS;
        let mut last_spawned = false;

        for (index, (stage, command)) in pipeline.stages().iter().zip(commands).enumerate() {
            let is_last = pipeline.next(index).is_none();
            let input = std::mem::replace(&mut upstream, StageInput::Empty);
            let launched = open_streams(stage, input, is_last)
                .and_then(|(stdin, stdout)| command.launch(stdin, stdout, &mut self.env));
            let launched = match launched {
                Ok(launched) => launched,
                Err(err) => {
                    abort(children);
                    return Err(err);
                }
            };

            last_spawned = matches!(launched, Launch::Spawned { .. });
            match launched {
                Launch::Finished { status: code, output } => {
                    status = code;
                    upstream = output.map_or(StageInput::Empty, StageInput::Buffered);
                }
                Launch::Spawned { mut child, feed } => {
                    upstream = child
                        .stdout
                        .take()
                        .map_or(StageInput::Empty, StageInput::Upstream);
                    if let Some(bytes) = feed {
                        feeds.push((child.stdin.take(), bytes));
                    }
                    children.push(child);
                }
            }
        }
        drop(upstream);
        feed_children(feeds);

        if pipeline.background {
            if let Some(last) = children.last() {
                let pid = last.id();
                println!("[{}]", pid);
                self.jobs.push(Job {
                    pid,
                    command: pipeline.to_string(),
                    children,
                    status: None,
                });
            }
            return Ok(status);
        }

        let count = children.len();
        for (index, mut child) in children.into_iter().enumerate() {
            match child.wait() {
                Ok(exit) => {
                    let code = exit_code(exit);
                    debug!(pid = child.id(), code, "child exited");
                    if last_spawned && index + 1 == count {
                        status = code;
                    }
                }
                Err(e) => warn!(pid = child.id(), error = %e, "wait failed"),
            }
        }
        Ok(status)
    }
}

/// Standard streams for one stage. Explicit redirections win over pipes.
fn open_streams(
    stage: &Stage,
    upstream: StageInput,
    is_last: bool,
) -> Result<(StageInput, StageOutput), ShellError> {
    let stdin = match stage.redirect(RedirectKind::Input) {
        Some(path) => StageInput::File(File::open(path).map_err(|e| ShellError::io(path, e))?),
        None => upstream,
    };

    let stdout = if let Some(path) = stage.redirect(RedirectKind::Output) {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ShellError::io(path, e))?;
        StageOutput::File(file)
    } else if let Some(path) = stage.redirect(RedirectKind::Append) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ShellError::io(path, e))?;
        StageOutput::File(file)
    } else if is_last {
        StageOutput::Inherit
    } else {
        StageOutput::Pipe
    };

    Ok((stdin, stdout))
}

/// Write captured builtin output into the stages that read it.
fn feed_children(feeds: Vec<(Option<ChildStdin>, Vec<u8>)>) {
    for (stdin, bytes) in feeds {
        let Some(mut stdin) = stdin else { continue };
        if let Err(e) = stdin.write_all(&bytes) {
            if e.kind() != ErrorKind::BrokenPipe {
                warn!(error = %e, "can't feed pipeline stage");
            }
        }
    }
}

/// Stop and reap the stages of a pipeline that failed to start completely.
fn abort(children: Vec<Child>) {
    for mut child in children {
        debug!(pid = child.id(), "aborting stage");
        if let Err(e) = child.kill().and_then(|_| child.wait().map(drop)) {
            warn!(pid = child.id(), error = %e, "can't reap aborted stage");
        }
    }
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::test_support::lock_current_dir;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn interpreter_in(dir: &Path) -> Interpreter {
        let mut config = Config::new(dir);
        config.search_path = std::env::var_os("PATH");
        Interpreter::with_default_commands(config)
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_tab_completes_unfinished_pipeline() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::new(temp.path());
        config.bin_dir = temp.path().join("bin");
        fs::create_dir(&config.bin_dir).unwrap();
        fs::write(config.bin_dir.join("kdump"), "").unwrap();
        let mut sh = Interpreter::with_default_commands(config);
        let mut pending = String::new();

        let flow = sh.dispatch("cat notes.txt | kdi?", &mut pending);
        assert_eq!(flow, Flow::Continue);
        assert_eq!(pending, "cat notes.txt | kdiff ");

        sh.dispatch("cat notes.txt | ?", &mut pending);
        assert_eq!(pending, "cat notes.txt | ");

        sh.dispatch("echo \"ab?", &mut pending);
        assert_eq!(pending, "echo \"ab");
        assert_eq!(sh.last_status(), 0);
    }

    #[test]
    fn test_output_redirect_truncates() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("out.txt");
        fs::write(&out, "old contents\n").unwrap();
        let mut sh = interpreter_in(temp.path());

        let flow = sh.execute_line(&format!("echo hello > {}", path_str(&out)));

        assert_eq!(flow, Flow::Continue);
        assert_eq!(sh.last_status(), 0);
        assert_eq!(fs::read_to_string(out).unwrap(), "hello\n");
    }

    #[test]
    fn test_append_redirect() {
        let temp = tempfile::tempdir().unwrap();
        let out = path_str(&temp.path().join("log.txt"));
        let mut sh = interpreter_in(temp.path());

        sh.execute_line(&format!("echo one >> {}", out));
        sh.execute_line(&format!("echo two >>{}", out));

        assert_eq!(fs::read_to_string(out).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_echo_pipe_tr_output() {
        let temp = tempfile::tempdir().unwrap();
        let out = path_str(&temp.path().join("out.txt"));
        let mut sh = interpreter_in(temp.path());

        sh.execute_line(&format!("echo hello | tr a-z A-Z > {}", out));

        assert_eq!(sh.last_status(), 0);
        assert_eq!(fs::read_to_string(out).unwrap(), "HELLO\n");
    }

    #[test]
    fn test_three_stage_pipeline_with_input_redirect() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("in.txt");
        fs::write(&input, "c\nb\na\n").unwrap();
        let out = path_str(&temp.path().join("out.txt"));
        let mut sh = interpreter_in(temp.path());

        sh.execute_line(&format!("cat < {} | sort | head -n 2 > {}", path_str(&input), out));

        assert_eq!(fs::read_to_string(out).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_builtin_output_feeds_external_stage() {
        let temp = tempfile::tempdir().unwrap();
        let out = path_str(&temp.path().join("out.txt"));
        let mut sh = interpreter_in(temp.path());

        sh.execute_line(&format!("shortdir list | tr a-z A-Z > {}", out));

        assert_eq!(sh.last_status(), 0);
        assert_eq!(
            fs::read_to_string(out).unwrap(),
            "THERE ISN'T ANY ASSOCIATION\n"
        );
    }

    #[test]
    fn test_redirect_on_inner_stage_leaves_next_stage_empty() {
        let temp = tempfile::tempdir().unwrap();
        let first = path_str(&temp.path().join("first.txt"));
        let second = path_str(&temp.path().join("second.txt"));
        let mut sh = interpreter_in(temp.path());

        sh.execute_line(&format!("echo hi > {} | cat > {}", first, second));

        assert_eq!(fs::read_to_string(first).unwrap(), "hi\n");
        assert_eq!(fs::read_to_string(second).unwrap(), "");
    }

    #[test]
    fn test_status_is_last_stage_status() {
        let temp = tempfile::tempdir().unwrap();
        let mut sh = interpreter_in(temp.path());

        sh.execute_line("sh -c \"exit 3\"");
        assert_eq!(sh.last_status(), 3);

        sh.execute_line("sh -c \"exit 3\" | true");
        assert_eq!(sh.last_status(), 0);
    }

    #[test]
    fn test_command_not_found_records_status() {
        let temp = tempfile::tempdir().unwrap();
        let mut sh = interpreter_in(temp.path());

        let flow = sh.execute_line("definitely-not-a-command-seashell --flag");

        assert_eq!(flow, Flow::Continue);
        assert_eq!(sh.last_status(), UNKNOWN);
    }

    #[test]
    fn test_unresolvable_stage_spawns_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("out.txt");
        let mut sh = interpreter_in(temp.path());

        sh.execute_line(&format!("echo hi > {} | no-such-tool-seashell", path_str(&out)));

        assert_eq!(sh.last_status(), UNKNOWN);
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_input_file_aborts_started_stages() {
        let temp = tempfile::tempdir().unwrap();
        let missing = path_str(&temp.path().join("missing.txt"));
        let mut sh = interpreter_in(temp.path());

        let started = Instant::now();
        let flow = sh.execute_line(&format!("sleep 5 | cat < {}", missing));

        assert_eq!(flow, Flow::Continue);
        assert_eq!(sh.last_status(), 1);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_parse_error_is_reported_and_continues() {
        let temp = tempfile::tempdir().unwrap();
        let mut sh = interpreter_in(temp.path());

        assert_eq!(sh.execute_line("echo \"unterminated"), Flow::Continue);
        assert_eq!(sh.last_status(), 1);
        assert_eq!(sh.execute_line("echo a | | b"), Flow::Continue);
    }

    #[test]
    fn test_blank_line_is_noop() {
        let temp = tempfile::tempdir().unwrap();
        let mut sh = interpreter_in(temp.path());
        sh.execute_line("definitely-not-a-command-seashell");

        assert_eq!(sh.execute_line("   "), Flow::Continue);
        assert_eq!(sh.last_status(), UNKNOWN);
    }

    #[test]
    fn test_exit_terminates() {
        let temp = tempfile::tempdir().unwrap();
        let mut sh = interpreter_in(temp.path());

        assert_eq!(sh.execute_line("exit"), Flow::Terminate);
        assert_eq!(sh.last_status(), 1);
        assert!(sh.environment().should_exit);
    }

    #[test]
    fn test_completion_request_is_not_executed() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("made");
        let mut sh = interpreter_in(temp.path());

        assert_eq!(
            sh.execute_line(&format!("touch {}?", path_str(&target))),
            Flow::Continue
        );
        assert!(!target.exists());
    }

    #[test]
    fn test_background_job_is_reaped() {
        let temp = tempfile::tempdir().unwrap();
        let mut sh = interpreter_in(temp.path());

        assert_eq!(sh.execute_line("sleep 0.2 &"), Flow::Continue);
        assert_eq!(sh.last_status(), 0);
        assert_eq!(sh.background_jobs(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while sh.background_jobs() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            sh.reap_background();
        }
        assert_eq!(sh.background_jobs(), 0);
    }

    #[test]
    fn test_cd_changes_directory_for_later_stages() {
        let _lock = lock_current_dir();
        let orig = std::env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();
        let mut sh = interpreter_in(temp.path());

        sh.execute_line(&format!("cd {}", path_str(&canonical)));
        sh.execute_line("pwd > where.txt");
        let written = fs::read_to_string(canonical.join("where.txt"));
        std::env::set_current_dir(&orig).expect("failed to restore cwd");

        assert_eq!(sh.environment().current_dir, canonical);
        assert_eq!(written.unwrap(), format!("{}\n", canonical.display()));
    }

    #[test]
    fn test_complete_uses_builtin_names() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::new(temp.path());
        config.bin_dir = temp.path().to_path_buf();
        let sh = Interpreter::with_default_commands(config);

        assert_eq!(sh.complete("shortd?").line, "shortdir ");
        assert_eq!(sh.complete("kd?").line, "kdiff ");
    }

    #[test]
    fn test_prompt_format() {
        let temp = tempfile::tempdir().unwrap();
        let sh = interpreter_in(temp.path());
        let prompt = sh.prompt();

        assert!(prompt.ends_with(" seashell$ "));
        assert!(prompt.contains(&format!(":{} ", sh.environment().current_dir.display())));
    }
}
