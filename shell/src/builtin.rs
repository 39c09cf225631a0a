use crate::alias::AliasStore;
use crate::command::{
    CommandFactory, EXIT, ExecutableCommand, ExitCode, Launch, SUCCESS, StageInput, StageOutput,
};
use crate::config::SYSNAME;
use crate::diff;
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use regex::{Regex, RegexBuilder};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They don't read standard input.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "kdiff" or "cd".
    fn name() -> &'static str;

    /// Executes the command writing to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn launch(
        self: Box<Self>,
        _stdin: StageInput,
        stdout: StageOutput,
        env: &mut Environment,
    ) -> Result<Launch, ShellError> {
        run_in_process(stdout, |out| match T::execute(*self, out, env) {
            Ok(x) => x,
            Err(e) => {
                eprintln!("-{}: {}: {:#}", SYSNAME, T::name(), e);
                1
            }
        })
    }
}

/// Run `body` against the writer that `stdout` stands for.
///
/// Output meant for a pipe is collected and handed back in the [`Launch`].
fn run_in_process(
    stdout: StageOutput,
    body: impl FnOnce(&mut dyn Write) -> ExitCode,
) -> Result<Launch, ShellError> {
    let (status, output) = match stdout {
        StageOutput::Inherit => {
            let mut out = io::stdout().lock();
            let status = body(&mut out);
            out.flush().map_err(|e| ShellError::io("stdout", e))?;
            (status, None)
        }
        StageOutput::File(mut file) => (body(&mut file), None),
        StageOutput::Pipe => {
            let mut buffer = Vec::new();
            let status = body(&mut buffer);
            (status, Some(buffer))
        }
    };
    Ok(Launch::Finished { status, output })
}

/// Usage text or argument errors produced by `argh`.
struct InvalidArgs {
    name: &'static str,
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn launch(
        self: Box<Self>,
        _stdin: StageInput,
        stdout: StageOutput,
        _env: &mut Environment,
    ) -> Result<Launch, ShellError> {
        if self.is_error {
            eprintln!("-{}: {}: {}", SYSNAME, self.name, self.output.trim_end());
            return Ok(Launch::Finished {
                status: 1,
                output: None,
            });
        }
        run_in_process(stdout, |out| match out.write_all(self.output.as_bytes()) {
            Ok(()) => SUCCESS,
            Err(_) => 1,
        })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    name: T::name(),
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }

    fn command_name(&self) -> Option<&'static str> {
        Some(T::name())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    /// Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => bail!("no target and HOME not set"),
            },
        };
        env.change_dir(&target)?;
        Ok(SUCCESS)
    }
}

#[derive(FromArgs)]
/// Exit shell process
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(EXIT)
    }
}

#[derive(FromArgs)]
/// Manage named shortcuts to directories.
pub struct ShortDir {
    #[argh(subcommand)]
    action: ShortDirAction,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ShortDirAction {
    Set(SetAlias),
    Jump(JumpAlias),
    Del(DelAlias),
    Clear(ClearAliases),
    List(ListAliases),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "set")]
/// Associate a name with a directory.
struct SetAlias {
    #[argh(positional)]
    /// shortcut name
    name: String,
    #[argh(positional)]
    /// directory; the current one when omitted
    path: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "jump")]
/// Change to the directory associated with a name.
struct JumpAlias {
    #[argh(positional)]
    /// shortcut name
    name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "del")]
/// Forget one association.
struct DelAlias {
    #[argh(positional)]
    /// shortcut name
    name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "clear")]
/// Forget every association.
struct ClearAliases {}

#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
/// Print every association.
struct ListAliases {}

impl BuiltinCommand for ShortDir {
    fn name() -> &'static str {
        "shortdir"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let store = AliasStore::from_config(&env.config);
        match self.action {
            ShortDirAction::Set(SetAlias { name, path }) => {
                let path = match path {
                    Some(p) => env.current_dir.join(p),
                    None => env.current_dir.clone(),
                };
                let path = path.to_string_lossy();
                store.set(&name, &path)?;
                writeln!(stdout, "{} is set as an alias for {}", name, path)?;
            }
            ShortDirAction::Jump(JumpAlias { name }) => match store.get(&name)? {
                Some(path) => env.change_dir(Path::new(&path))?,
                None => {
                    writeln!(stdout, "There is no associated path with the given name")?;
                    return Ok(1);
                }
            },
            ShortDirAction::Del(DelAlias { name }) => {
                if store.remove(&name)? {
                    writeln!(stdout, "{} association is removed", name)?;
                } else {
                    writeln!(stdout, "No association with the given name {}", name)?;
                    return Ok(1);
                }
            }
            ShortDirAction::Clear(ClearAliases {}) => {
                store.clear()?;
                writeln!(stdout, "All associations are removed")?;
            }
            ShortDirAction::List(ListAliases {}) => {
                let entries = store.load()?;
                if entries.is_empty() {
                    writeln!(stdout, "There isn't any association")?;
                }
                for entry in entries {
                    writeln!(stdout, "NAME: {}", entry.name)?;
                    writeln!(stdout, "PATH: {}", entry.path)?;
                }
            }
        }
        Ok(SUCCESS)
    }
}

/// Highlight colour accepted by `highlight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    const RESET: &'static str = "\x1b[0m";

    fn escape(self) -> &'static str {
        match self {
            Color::Red => "\x1b[;31m",
            Color::Green => "\x1b[;32m",
            Color::Blue => "\x1b[;34m",
        }
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(Color::Red),
            "g" => Ok(Color::Green),
            "b" => Ok(Color::Blue),
            other => Err(format!("unknown colour '{}', expected r, g or b", other)),
        }
    }
}

#[derive(FromArgs)]
/// Print a file with every occurrence of a word coloured.
pub struct Highlight {
    #[argh(positional)]
    /// word to look for, compared case-insensitively
    pub word: String,

    #[argh(positional)]
    /// colour: r, g or b
    pub color: Color,

    #[argh(positional)]
    /// file to print
    pub file: String,
}

impl Highlight {
    fn matcher(&self) -> Result<Regex> {
        let pattern = format!("^{}$", regex::escape(&self.word));
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid word: {}", self.word))
    }

    fn highlight_line(&self, re: &Regex, line: &str) -> String {
        line.split(' ')
            .map(|token| {
                if !token.is_empty() && re.is_match(token) {
                    format!("{}{}{}", self.color.escape(), token, Color::RESET)
                } else {
                    token.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl BuiltinCommand for Highlight {
    fn name() -> &'static str {
        "highlight"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let re = self.matcher()?;
        let text =
            fs::read_to_string(&self.file).with_context(|| format!("can't read {}", self.file))?;
        for line in text.lines() {
            writeln!(stdout, "{}", self.highlight_line(&re, line))?;
        }
        Ok(SUCCESS)
    }
}

/// Wall-clock time written as `HH.MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTime {
    pub hour: u8,
    pub minute: u8,
}

impl FromStr for AlarmTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad_format = || format!("invalid time '{}', expected HH.MM", s);
        let (hour, minute) = s.split_once('.').ok_or_else(bad_format)?;
        let hour: u8 = hour.parse().map_err(|_| bad_format())?;
        let minute: u8 = minute.parse().map_err(|_| bad_format())?;
        if hour > 23 {
            return Err(format!("hour must be between 0 and 23, got {}", hour));
        }
        if minute > 59 {
            return Err(format!("minute must be between 0 and 59, got {}", minute));
        }
        Ok(AlarmTime { hour, minute })
    }
}

#[derive(FromArgs)]
/// Schedule a daily cron job that plays an audio file.
pub struct GoodMorning {
    #[argh(positional)]
    /// time of day as HH.MM
    pub time: AlarmTime,

    #[argh(positional)]
    /// audio file to play
    pub audio: String,
}

impl GoodMorning {
    fn cron_line(&self, player: &str, audio: &Path) -> String {
        format!(
            "{} {} * * * {} {}\n",
            self.time.minute,
            self.time.hour,
            player,
            audio.display()
        )
    }
}

impl BuiltinCommand for GoodMorning {
    fn name() -> &'static str {
        "goodMorning"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let audio = env.current_dir.join(&self.audio);
        let job_file = &env.config.cron_job_file;
        fs::write(job_file, self.cron_line(&env.config.audio_player, &audio))
            .with_context(|| format!("can't write {}", job_file.display()))?;

        let status = process::Command::new(&env.config.crontab)
            .arg(job_file)
            .status()
            .with_context(|| format!("can't run {}", env.config.crontab.display()))?;
        if !status.success() {
            bail!("{} failed with {}", env.config.crontab.display(), status);
        }
        writeln!(
            stdout,
            "Alarm set for {:02}.{:02}",
            self.time.hour, self.time.minute
        )?;
        Ok(SUCCESS)
    }
}

fn is_text_file(name: &str) -> bool {
    name.ends_with(".txt")
}

#[derive(FromArgs)]
/// Compare two files line by line, or byte by byte with -b.
pub struct KDiff {
    #[argh(switch, short = 'b')]
    /// compare raw bytes instead of lines
    pub binary: bool,

    #[argh(positional)]
    /// first file
    pub first: String,

    #[argh(positional)]
    /// second file
    pub second: String,
}

impl KDiff {
    fn read(name: &str) -> Result<Vec<u8>> {
        fs::read(name).with_context(|| format!("can't read {}", name))
    }
}

impl BuiltinCommand for KDiff {
    fn name() -> &'static str {
        "kdiff"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        if self.binary {
            let n = diff::count_byte_differences(
                &Self::read(&self.first)?,
                &Self::read(&self.second)?,
            );
            if n == 0 {
                writeln!(stdout, "The two files are identical")?;
            } else {
                writeln!(stdout, "The two files are different in {} bytes", n)?;
            }
            return Ok(SUCCESS);
        }

        if !is_text_file(&self.first) || !is_text_file(&self.second) {
            bail!("both files must be .txt files; use -b to compare other files");
        }
        let first = String::from_utf8_lossy(&Self::read(&self.first)?).into_owned();
        let second = String::from_utf8_lossy(&Self::read(&self.second)?).into_owned();

        let mismatches = diff::compare_lines(&first, &second);
        for m in &mismatches {
            writeln!(stdout, "{}:Line {}: {}", self.first, m.line, m.left)?;
            writeln!(stdout, "{}:Line {}: {}", self.second, m.line, m.right)?;
        }
        if mismatches.is_empty() {
            writeln!(stdout, "The two files are identical")?;
        } else {
            writeln!(stdout, "{} different lines found", mismatches.len())?;
        }
        Ok(SUCCESS)
    }
}

#[derive(FromArgs)]
/// Append text files to an output text file.
pub struct Concatenate {
    #[argh(positional)]
    /// file to append to; created when missing
    pub output: String,

    #[argh(positional, greedy)]
    /// files to append, in order
    pub inputs: Vec<String>,
}

impl BuiltinCommand for Concatenate {
    fn name() -> &'static str {
        "concatenate"
    }

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        if self.inputs.is_empty() {
            bail!(
                "there should be at least 2 arguments, {} given",
                1 + self.inputs.len()
            );
        }
        if let Some(bad) = std::iter::once(&self.output)
            .chain(&self.inputs)
            .find(|name| !is_text_file(name))
        {
            bail!("{} is not a .txt file", bad);
        }

        let mut output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output)
            .with_context(|| format!("can't open {}", self.output))?;
        for input in &self.inputs {
            let bytes = fs::read(input).with_context(|| format!("can't read {}", input))?;
            output.write_all(&bytes)?;
            if !bytes.is_empty() && !bytes.ends_with(b"\n") {
                output.write_all(b"\n")?;
            }
        }
        Ok(SUCCESS)
    }
}
