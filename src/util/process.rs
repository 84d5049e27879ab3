//! Subprocess execution utilities.
//!
//! Stage commands are described by a [`ProcessBuilder`] and run through a
//! [`CommandExecutor`]. The real executor, [`SystemExecutor`], blocks until
//! the child exits, keeps only a bounded tail of its output, and registers
//! the child so an interrupt can tear it down.

use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;

/// Number of output lines kept per stream for diagnostics.
pub const TAIL_LINES: usize = 40;

/// Builder for subprocess execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the extra environment.
    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| {
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("\"{}\"", a)
            } else {
                a.clone()
            }
        }));
        parts.join(" ")
    }
}

/// How a finished process ended, with bounded output tails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a described process to completion.
///
/// `Err` means the program could not be started at all; a program that ran
/// and exited nonzero is an `Ok` outcome.
pub trait CommandExecutor {
    fn execute(&mut self, cmd: &ProcessBuilder) -> io::Result<ProcessOutcome>;
}

/// Executor that spawns real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    echo: bool,
}

impl SystemExecutor {
    pub fn new() -> Self {
        SystemExecutor::default()
    }

    /// Forward child output to stderr as it arrives.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&mut self, builder: &ProcessBuilder) -> io::Result<ProcessOutcome> {
        let mut cmd = builder.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // Own process group, so an interrupt can reach the whole tool tree.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        tracing::debug!("Running `{}`", builder.display_command());

        let (mut child, _guard) = RUNNING_CHILD.spawn(&mut cmd)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let echo = self.echo;

        let stdout_reader = stdout.map(|s| thread::spawn(move || collect_tail(s, echo)));
        let stderr_reader = stderr.map(|s| thread::spawn(move || collect_tail(s, echo)));

        let status = child.wait()?;

        let stdout_tail = stdout_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr_tail = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        Ok(ProcessOutcome {
            exit_code: status.code(),
            stdout_tail,
            stderr_tail,
        })
    }
}

/// Bounded buffer holding the last lines of a stream.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        TailBuffer {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

fn collect_tail(stream: impl Read, echo: bool) -> String {
    let mut reader = BufReader::new(stream);
    let mut tail = TailBuffer::new(TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if echo {
                    eprintln!("{}", line);
                }
                tail.push(line);
            }
        }
    }

    tail.into_string()
}

/// Tracks the child currently being waited on so an interrupt can reach it.
///
/// Spawning and registering happen under one lock, and an interrupt takes
/// the same lock, so a child is either killed or never started.
#[derive(Debug)]
pub struct ChildRegistry {
    slot: Mutex<Option<u32>>,
    interrupted: AtomicBool,
}

static RUNNING_CHILD: ChildRegistry = ChildRegistry::new();

impl ChildRegistry {
    pub const fn new() -> Self {
        ChildRegistry {
            slot: Mutex::new(None),
            interrupted: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<u32>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn `cmd` and register it until the returned guard drops.
    pub fn spawn(&self, cmd: &mut Command) -> io::Result<(Child, RegisteredChild<'_>)> {
        let mut slot = self.lock();
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"));
        }
        let child = cmd.spawn()?;
        *slot = Some(child.id());
        Ok((child, RegisteredChild { registry: self }))
    }

    /// Refuse further spawns and return the registered child, if any.
    pub fn interrupt(&self) -> Option<u32> {
        self.interrupted.store(true, Ordering::SeqCst);
        *self.lock()
    }
}

impl Default for ChildRegistry {
    fn default() -> Self {
        ChildRegistry::new()
    }
}

/// Clears the registry slot on drop.
#[derive(Debug)]
pub struct RegisteredChild<'a> {
    registry: &'a ChildRegistry,
}

impl Drop for RegisteredChild<'_> {
    fn drop(&mut self) {
        *self.registry.lock() = None;
    }
}

/// Terminate the running child process tree, if any, and block new ones.
pub fn terminate_running_child() {
    let Some(pid) = RUNNING_CHILD.interrupt() else {
        return;
    };

    #[cfg(unix)]
    {
        // Negative pid addresses the child's process group.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    {
        // Console control events already reach every process attached to the console.
        let _ = pid;
    }
}

/// Install a SIGINT/SIGTERM handler that tears down the running child and
/// exits with status 130.
pub fn install_interrupt_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        terminate_running_child();
        eprintln!("\ninterrupted");
        std::process::exit(130);
    })?;
    Ok(())
}

/// Find an executable in PATH.
pub fn find_executable(name: impl AsRef<OsStr>) -> Option<PathBuf> {
    which::which(name).ok()
}
