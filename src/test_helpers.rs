//! A recording host for exercising the session lifecycle without touching the system.

use std::io;
use std::path::{Path, PathBuf};

use crate::command::{Host, Invocation, Status};
use crate::error::*;

/// Records every command and write, answering with scripted results.
#[derive(Debug, Default)]
pub struct FakeHost {
    commands: Vec<Invocation>,
    writes: Vec<(PathBuf, String, bool)>,
    statuses: Vec<(Vec<String>, Status)>,
    interrupt_on: Option<Vec<String>>,
    interrupted: bool,
    route: String,
    mounts: String,
}

impl FakeHost {
    pub fn new() -> FakeHost {
        FakeHost {
            route: "8.8.8.8 via 192.168.1.1 dev eth0 src 192.168.1.20 uid 1000".to_string(),
            mounts: "proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0\n".to_string(),
            ..Default::default()
        }
    }

    /// Answer `ip route get` with the given route.
    pub fn route(mut self, route: &str) -> FakeHost {
        self.route = route.to_string();
        self
    }

    /// Contents of `/proc/mounts`.
    pub fn mounts(mut self, mounts: &str) -> FakeHost {
        self.mounts = mounts.to_string();
        self
    }

    /// Finish commands starting with `prefix` with the given status.
    pub fn exit_with(mut self, prefix: &[&str], status: Status) -> FakeHost {
        self.statuses.push((owned(prefix), status));
        self
    }

    /// Deliver a terminating signal while a command starting with `prefix` runs.
    pub fn interrupt_on(mut self, prefix: &[&str]) -> FakeHost {
        self.interrupt_on = Some(owned(prefix));
        self
    }

    pub fn commands(&self) -> &[Invocation] {
        &self.commands
    }

    pub fn writes(&self) -> &[(PathBuf, String, bool)] {
        &self.writes
    }

    /// Commands starting with `prefix`.
    pub fn matching(&self, prefix: &[&str]) -> Vec<&Invocation> {
        let prefix = owned(prefix);
        self.commands
            .iter()
            .filter(|cmd| cmd.argv().starts_with(&prefix))
            .collect()
    }

    fn record(&mut self, cmd: &Invocation) -> Status {
        self.commands.push(cmd.clone());

        if let Some(ref prefix) = self.interrupt_on {
            if cmd.argv().starts_with(prefix) {
                self.interrupted = true;
            }
        }

        if cmd.argv().first().map(String::as_str) == Some("mount") {
            let target = cmd.argv().last().cloned().unwrap_or_default();
            self.mounts
                .push_str(&format!("net_cls {} cgroup rw,relatime,net_cls 0 0\n", target));
        }

        self.statuses
            .iter()
            .find(|(prefix, _)| cmd.argv().starts_with(prefix))
            .map(|&(_, status)| status)
            .unwrap_or(Status::Exited(0))
    }
}

impl Host for FakeHost {
    fn status(&mut self, cmd: &Invocation) -> Result<Status> {
        Ok(self.record(cmd))
    }

    fn output(&mut self, cmd: &Invocation) -> Result<(Status, String)> {
        let status = self.record(cmd);
        Ok((status, self.route.clone()))
    }

    fn read_to_string(&mut self, path: &Path) -> Result<String> {
        if path == Path::new("/proc/mounts") {
            Ok(self.mounts.clone())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, path.display().to_string()).into())
        }
    }

    fn write(&mut self, path: &Path, contents: &str, escalate: bool) -> Result<()> {
        self.writes.push((path.to_path_buf(), contents.to_string(), escalate));
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.interrupted
    }
}

fn owned(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|arg| arg.to_string()).collect()
}
