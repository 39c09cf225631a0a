use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Launch, StageInput, StageOutput};
use crate::config::Config;
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use std::ffi::OsStr;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tracing::debug;

/// Command that is not a builtin.
pub struct ExternalCommand {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(name: String, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            name,
            program,
            args,
        }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let program = resolve_command(&env.config, name)?;
        Some(Box::new(ExternalCommand::new(
            name.to_string(),
            program,
            args.iter().map(|x| x.to_string()).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn launch(
        self: Box<Self>,
        stdin: StageInput,
        stdout: StageOutput,
        _env: &mut Environment,
    ) -> Result<Launch, ShellError> {
        let (stdin, feed) = stdin.into_stdio();
        let child = std::process::Command::new(&self.program)
            .arg0(&self.name)
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout.into_stdio())
            .spawn()
            .map_err(|source| ShellError::Spawn {
                name: self.name.clone(),
                source,
            })?;
        debug!(pid = child.id(), program = %self.program.display(), "spawned");
        Ok(Launch::Spawned { child, feed })
    }
}

/// Map a child's exit status to a shell status code.
pub(crate) fn exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

/// Resolve a command name to the program file to run.
///
/// Behavior:
/// - Names starting with `/` or `.`: taken as a path, returned if it is a file.
/// - Names in the known-tool table: their fixed location, if present.
/// - Anything else: `bin_dir/name`, then for bare names each directory of the
///   startup `PATH`.
/// - Empty name: `None`.
pub fn resolve_command(config: &Config, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.starts_with('/') || name.starts_with('.') {
        return find_by_path(Path::new(name)).map(Path::to_path_buf);
    }

    if let Some(tool) = config.known_tool(name).and_then(find_by_path) {
        return Some(tool.to_path_buf());
    }

    let candidate = config.bin_dir.join(name);
    if find_by_path(&candidate).is_some() {
        return Some(candidate);
    }

    if name.contains('/') {
        return None;
    }
    config
        .search_path
        .as_deref()
        .and_then(|paths| find_in_path(paths, OsStr::new(name)))
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::lock_current_dir;
    use std::ffi::OsString;
    use std::fs::{self, File};
    use std::io::Read;

    fn config_with_bin(bin_dir: &Path) -> Config {
        let mut config = Config::new("/");
        config.bin_dir = bin_dir.to_path_buf();
        config
    }

    #[test]
    fn absolute_existing_path() {
        let config = config_with_bin(Path::new("/nonexistent"));
        assert_eq!(resolve_command(&config, "/bin/sh"), Some(PathBuf::from("/bin/sh")));
    }

    #[test]
    fn absolute_missing_path() {
        let config = config_with_bin(Path::new("/bin"));
        assert_eq!(resolve_command(&config, "/bin/nonexisting-seashell"), None);
    }

    #[test]
    fn bare_name_resolves_in_bin_dir() {
        let config = config_with_bin(Path::new("/bin"));
        assert_eq!(resolve_command(&config, "sh"), Some(PathBuf::from("/bin/sh")));
    }

    #[test]
    fn known_tool_wins_over_bin_dir() {
        let temp = tempfile::tempdir().unwrap();
        let tool = temp.path().join("mytool");
        File::create(&tool).unwrap();

        let mut config = config_with_bin(Path::new("/bin"));
        config.known_tools.insert("sh".to_string(), tool.clone());
        assert_eq!(resolve_command(&config, "sh"), Some(tool));
    }

    #[test]
    fn missing_known_tool_falls_back_to_bin_dir() {
        let mut config = config_with_bin(Path::new("/bin"));
        config
            .known_tools
            .insert("sh".to_string(), PathBuf::from("/nonexistent/sh"));
        assert_eq!(resolve_command(&config, "sh"), Some(PathBuf::from("/bin/sh")));
    }

    #[test]
    fn search_path_is_the_last_resort() {
        let empty_bin = tempfile::tempdir().unwrap();
        let mut config = config_with_bin(empty_bin.path());
        assert_eq!(resolve_command(&config, "sh"), None);

        config.search_path = Some(OsString::from("/nonexistent:/bin"));
        assert_eq!(resolve_command(&config, "sh"), Some(PathBuf::from("/bin/sh")));
    }

    #[test]
    fn directories_and_empty_names_do_not_resolve() {
        let config = config_with_bin(Path::new("/"));
        assert_eq!(resolve_command(&config, ""), None);
        assert_eq!(resolve_command(&config, "bin"), None);
        assert_eq!(resolve_command(&config, "/tmp"), None);
    }

    #[test]
    fn dot_prefixed_name_is_relative_to_cwd() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let temp = tempfile::tempdir().unwrap();
        File::create(temp.path().join("foo")).expect("touch foo");

        std::env::set_current_dir(temp.path()).expect("set cwd");
        let config = config_with_bin(Path::new("/bin"));
        let res = resolve_command(&config, "./foo");
        let missing = resolve_command(&config, "./bar");
        std::env::set_current_dir(&cwd_before).ok();

        assert_eq!(res, Some(PathBuf::from("./foo")));
        assert_eq!(missing, None);
    }

    #[test]
    fn launch_pipes_child_output() {
        let mut env = Environment::new(Config::new("/"));
        let cmd = Box::new(ExternalCommand::new(
            "sh".to_string(),
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), "echo $0 hi".to_string()],
        ));

        let launched = cmd
            .launch(StageInput::Empty, StageOutput::Pipe, &mut env)
            .unwrap();
        let Launch::Spawned { mut child, feed } = launched else {
            panic!("expected a child process");
        };
        assert!(feed.is_none());

        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
        let status = child.wait().unwrap();

        assert_eq!(exit_code(status), 0);
        assert_eq!(out, "sh hi\n");
    }

    #[test]
    fn launch_feeds_buffered_input() {
        use std::io::Write;

        let temp = tempfile::tempdir().unwrap();
        let out_path = temp.path().join("out.txt");
        let mut env = Environment::new(Config::new("/"));
        let cmd = Box::new(ExternalCommand::new(
            "cat".to_string(),
            PathBuf::from("/bin/cat"),
            Vec::new(),
        ));

        let launched = cmd
            .launch(
                StageInput::Buffered(b"fed\n".to_vec()),
                StageOutput::File(File::create(&out_path).unwrap()),
                &mut env,
            )
            .unwrap();
        let Launch::Spawned { mut child, feed } = launched else {
            panic!("expected a child process");
        };

        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(&feed.unwrap()).unwrap();
        drop(stdin);
        child.wait().unwrap();

        assert_eq!(fs::read_to_string(out_path).unwrap(), "fed\n");
    }

    #[test]
    fn launch_reports_spawn_failure() {
        let temp = tempfile::tempdir().unwrap();
        let not_executable = temp.path().join("plain.txt");
        File::create(&not_executable).unwrap();

        let mut env = Environment::new(Config::new("/"));
        let cmd = Box::new(ExternalCommand::new(
            "plain.txt".to_string(),
            not_executable,
            Vec::new(),
        ));
        let err = cmd
            .launch(StageInput::Empty, StageOutput::Pipe, &mut env)
            .unwrap_err();
        assert!(matches!(err, ShellError::Spawn { ref name, .. } if name == "plain.txt"));
    }
}
