//! Execution of external commands.
//!
//! All host configuration is performed by shelling out to the standard Linux tools (`tc`,
//! `cgcreate`, `mount`, ...). The [`Host`](trait.Host.html) trait is the boundary between the
//! session logic and the operating system so that the whole lifecycle can be exercised without
//! touching the live network configuration.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use unshare::{self, Stdio};

use crate::error::*;
use crate::signal;

/// A single external command to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    argv: Vec<String>,
    escalate: bool,
    discard_stderr: bool,
}

impl Invocation {
    /// Construct an invocation of the given argument vector.
    pub fn new<I, S>(argv: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            argv: argv.into_iter().map(Into::into).collect(),
            escalate: false,
            discard_stderr: false,
        }
    }

    /// Run the command with elevated privileges.
    pub fn escalate(mut self, escalate: bool) -> Invocation {
        self.escalate = escalate;
        self
    }

    /// Throw away anything the command writes to stderr.
    pub fn quiet(mut self) -> Invocation {
        self.discard_stderr = true;
        self
    }

    /// The argument vector, program first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Whether the command is run with elevated privileges.
    pub fn escalated(&self) -> bool {
        self.escalate
    }

    /// Whether the command's stderr is discarded.
    pub fn discards_stderr(&self) -> bool {
        self.discard_stderr
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// How an external command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Exited normally with the given code.
    Exited(i32),
    /// Killed by the given signal number.
    Signaled(i32),
}

impl Status {
    /// The equivalent process exit code, following the shell convention for signals.
    pub fn code(&self) -> i32 {
        match *self {
            Status::Exited(code) => code,
            Status::Signaled(signo) => 128 + signo,
        }
    }

    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        *self == Status::Exited(0)
    }
}

impl From<unshare::ExitStatus> for Status {
    fn from(status: unshare::ExitStatus) -> Status {
        match status {
            unshare::ExitStatus::Exited(code) => Status::Exited(code as u8 as i32),
            unshare::ExitStatus::Signaled(signal, _) => Status::Signaled(signal as i32),
        }
    }
}

/// Access to the host operating system.
///
/// Implementors provide the primitive operations; the checked and best-effort modes of execution
/// are shared by every implementation.
pub trait Host {
    /// Run a command to completion with inherited stdio.
    fn status(&mut self, cmd: &Invocation) -> Result<Status>;

    /// Run a command to completion, capturing its stdout.
    fn output(&mut self, cmd: &Invocation) -> Result<(Status, String)>;

    /// Read the contents of a host file.
    fn read_to_string(&mut self, path: &Path) -> Result<String>;

    /// Replace the contents of a host file, escalating privileges if requested.
    fn write(&mut self, path: &Path, contents: &str, escalate: bool) -> Result<()>;

    /// Whether the process has received a terminating signal.
    fn interrupted(&self) -> bool {
        signal::interrupted()
    }

    /// Run a command and return its exit code.
    fn run(&mut self, cmd: &Invocation) -> Result<i32> {
        Ok(self.status(cmd)?.code())
    }

    /// Run a command that must succeed.
    fn run_checked(&mut self, cmd: &Invocation) -> Result<()> {
        let code = self.run(cmd)?;
        if code != 0 {
            bail!(ErrorKind::CommandFailed(cmd.argv().to_vec(), code));
        }
        Ok(())
    }

    /// Run a command whose failure is irrelevant.
    fn run_best_effort(&mut self, cmd: &Invocation) {
        match self.run(cmd) {
            Ok(0) => {}
            Ok(code) => debug!("ignoring exit code {} of '{}'", code, cmd),
            Err(err) => debug!("ignoring failure of '{}': {}", cmd, err),
        }
    }
}

/// The live operating system.
#[derive(Debug, Clone)]
pub struct System {
    escalation: Vec<String>,
}

impl System {
    /// Execute commands on this host, escalating with the given command prefix.
    pub fn new(escalation: Vec<String>) -> System {
        System { escalation }
    }

    /// Build the process for an invocation.
    fn command(&self, cmd: &Invocation) -> Result<unshare::Command> {
        let mut argv: Vec<&str> = Vec::new();
        if cmd.escalated() {
            argv.extend(self.escalation.iter().map(String::as_str));
        }
        argv.extend(cmd.argv().iter().map(String::as_str));

        let (program, args) = match argv.split_first() {
            Some(split) => split,
            None => bail!(ErrorKind::MissingCommand),
        };

        debug!("executing '{}'", argv.join(" "));
        let mut command = unshare::Command::new(find_program(program));
        command.args(args);
        if cmd.discards_stderr() {
            command.stderr(Stdio::null());
        }

        Ok(command)
    }

    /// Wait for a child while forwarding terminating signals to it.
    fn wait(child: &mut unshare::Child) -> Result<Status> {
        signal::forward_to(child.pid());
        let status = child.wait();
        signal::forward_to(0);
        Ok(status?.into())
    }
}

impl Default for System {
    fn default() -> System {
        System::new(vec!["sudo".to_string()])
    }
}

impl Host for System {
    fn status(&mut self, cmd: &Invocation) -> Result<Status> {
        let mut child = self.command(cmd)?.spawn()?;
        System::wait(&mut child)
    }

    fn output(&mut self, cmd: &Invocation) -> Result<(Status, String)> {
        let mut command = self.command(cmd)?;
        command.stdout(Stdio::piped());
        let mut child = command.spawn()?;

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout)?;
        }

        Ok((System::wait(&mut child)?, stdout))
    }

    fn read_to_string(&mut self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn write(&mut self, path: &Path, contents: &str, escalate: bool) -> Result<()> {
        if !escalate {
            debug!("writing '{}' to {}", contents, path.display());
            return Ok(fs::write(path, contents)?);
        }

        let tee = Invocation::new(vec!["tee".to_string(), path.display().to_string()])
            .escalate(true);
        let mut command = self.command(&tee)?;
        command.stdin(Stdio::piped()).stdout(Stdio::null());
        let mut child = command.spawn()?;

        if let Some(mut pipe) = child.stdin.take() {
            if let Err(err) = pipe.write_all(contents.as_bytes()) {
                warn!("unable to pass '{}' to '{}': {}", contents, tee, err);
            }
        }

        let code = System::wait(&mut child)?.code();
        if code != 0 {
            let mut argv = self.escalation.clone();
            argv.extend(tee.argv().iter().cloned());
            bail!(ErrorKind::CommandFailed(argv, code));
        }

        Ok(())
    }
}

/// Locate a program on `PATH`.
///
/// Names containing a path separator, or that cannot be found, are returned unchanged and left
/// for `execve` to reject.
fn find_program(name: &str) -> PathBuf {
    if name.contains('/') {
        return PathBuf::from(name);
    }

    let path = env::var_os("PATH")
        .unwrap_or_else(|| OsString::from("/usr/sbin:/usr/bin:/sbin:/bin"));
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeHost;

    #[test]
    fn signal_status_maps_to_shell_code() {
        assert_eq!(Status::Exited(7).code(), 7);
        assert_eq!(Status::Signaled(2).code(), 130);
        assert!(Status::Exited(0).success());
        assert!(!Status::Signaled(9).success());
    }

    #[test]
    fn checked_run_reports_command_and_code() {
        let mut host = FakeHost::new().exit_with(&["tc", "qdisc", "add"], Status::Exited(2));
        let cmd = Invocation::new(vec!["tc", "qdisc", "add", "dev", "eth0"]);

        let err = host.run_checked(&cmd).unwrap_err();
        match *err.kind() {
            ErrorKind::CommandFailed(ref argv, code) => {
                assert_eq!(argv, cmd.argv());
                assert_eq!(code, 2);
            }
            ref other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn best_effort_run_swallows_failure() {
        let mut host = FakeHost::new().exit_with(&["tc", "qdisc", "del"], Status::Exited(2));
        host.run_best_effort(&Invocation::new(vec!["tc", "qdisc", "del"]).quiet());
        assert_eq!(host.commands().len(), 1);
        assert!(host.commands()[0].discards_stderr());
    }

    #[test]
    fn escalation_flag_is_recorded() {
        let cmd = Invocation::new(vec!["modprobe", "cls_cgroup"]).escalate(true);
        assert!(cmd.escalated());
        assert_eq!(cmd.to_string(), "modprobe cls_cgroup");
    }

    #[test]
    fn absolute_programs_are_not_searched() {
        assert_eq!(find_program("/sbin/tc"), PathBuf::from("/sbin/tc"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cmd = Invocation::new(vec!["/nonexistent/netem-exec-missing"]);
        let err = System::default().status(&cmd).unwrap_err();
        match *err.kind() {
            ErrorKind::Spawn(_) => {}
            ref other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.exit_code(), 1);
    }
}
