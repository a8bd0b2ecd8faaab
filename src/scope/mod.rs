//! The impairment scope: a control group and the traffic control tree matching it.
//!
//! Linux can tag every packet sent by the members of a net_cls control group with a class id.
//! The scope consists of:
//!
//! * a [control group](struct.ControlGroup.html) the command is run in, and
//! * a [qdisc tree](struct.Qdisc.html) on the network device which sends tagged packets through
//!   `netem` and everything else through an unimpaired band.
//!
//! The control group name and the qdisc handles are fixed, so two sessions running at the same
//! time on one host overwrite each other's configuration. This is not supported.

mod control_group;
mod qdisc;

use std::fmt;
use std::path::Path;

use nix::unistd::{getgid, getuid};
use tracing::{debug, info, warn};

pub use self::control_group::{
    ControlGroup, CONTROL_DIR, DEFAULT_CLASSID, SCOPE_CLASSID, SCOPE_NAME,
};
pub use self::qdisc::{Qdisc, IMPAIRED_BAND, ROOT_HANDLE};

use crate::command::{Host, Invocation, Status};
use crate::error::*;

mod prelude {
    pub(super) use crate::command::Invocation;
}

const MOUNTS: &str = "/proc/mounts";

/// The individual steps of preparing a scope, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    /// Load the cls_cgroup kernel module.
    LoadModule,
    /// Create the controller mount point.
    ControlDir,
    /// Mount the net_cls controller.
    Mount,
    /// Create the control group.
    CreateGroup,
    /// Hand the membership file to the calling user.
    GrantMembership,
    /// Remove a root qdisc left on the device.
    ClearRoot,
    /// Install the root priority qdisc.
    RootQdisc,
    /// Install the cgroup filter.
    Filter,
    /// Write the default and group class ids.
    ClassIds,
    /// Apply the netem options to the impaired band.
    Netem,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let action = match *self {
            SetupStep::LoadModule => "load the cls_cgroup module",
            SetupStep::ControlDir => "create the net_cls control directory",
            SetupStep::Mount => "mount the net_cls controller",
            SetupStep::CreateGroup => "create the control group",
            SetupStep::GrantMembership => "grant membership of the control group",
            SetupStep::ClearRoot => "clear the root qdisc",
            SetupStep::RootQdisc => "install the root qdisc",
            SetupStep::Filter => "install the cgroup filter",
            SetupStep::ClassIds => "assign class ids",
            SetupStep::Netem => "apply the netem options",
        };
        f.write_str(action)
    }
}

/// Lifecycle of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing on the host has been touched.
    Idle,
    /// Setup has been attempted, possibly partially.
    Prepared,
    /// The command has been started.
    Running,
    /// The qdisc tree has been removed.
    TornDown,
}

/// Guard over the host configuration of one session.
///
/// Dropping the scope removes the qdisc tree from the device, however the session ends.
#[derive(Debug)]
pub struct Scope<'h, H: Host + ?Sized> {
    host: &'h mut H,
    group: ControlGroup,
    qdisc: Qdisc,
    escalate: bool,
    owner: Option<(u32, u32)>,
    state: State,
}

impl<'h, H: Host + ?Sized> Scope<'h, H> {
    /// An idle scope for the given device.
    ///
    /// With `escalate`, host commands are run with elevated privileges and the control group
    /// membership is handed to the calling user so that the command itself runs unprivileged.
    pub fn new<S: Into<String>>(host: &'h mut H, device: S, escalate: bool) -> Scope<'h, H> {
        let owner = if escalate {
            Some((getuid().as_raw(), getgid().as_raw()))
        } else {
            None
        };

        Scope {
            host,
            group: ControlGroup::new(),
            qdisc: Qdisc::new(device),
            escalate,
            owner,
            state: State::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Configure the host to apply the netem options to the control group's traffic.
    ///
    /// Every step tolerates configuration left behind by an earlier session, so preparing an
    /// already prepared scope succeeds.
    pub fn prepare(&mut self, options: &[String]) -> Result<()> {
        match self.state {
            State::Idle | State::Prepared => {}
            state => bail!("cannot prepare a scope that is {:?}", state),
        }
        self.state = State::Prepared;

        self.step(SetupStep::LoadModule, |scope| {
            scope.checked(scope.group.load_module())
        })?;

        self.step(SetupStep::ControlDir, |scope| {
            scope.checked(scope.group.make_control_dir())
        })?;

        self.step(SetupStep::Mount, |scope| {
            let mounts = scope.host.read_to_string(Path::new(MOUNTS))?;
            if scope.group.is_mounted(&mounts) {
                debug!("net_cls controller already mounted");
                return Ok(());
            }
            scope.checked(scope.group.mount())
        })?;

        self.step(SetupStep::CreateGroup, |scope| {
            scope.checked(scope.group.create())
        })?;

        if let Some((uid, gid)) = self.owner {
            self.step(SetupStep::GrantMembership, |scope| {
                scope.checked(scope.group.grant_membership(uid, gid))
            })?;
        }

        self.step(SetupStep::ClearRoot, |scope| {
            let cmd = scope.qdisc.delete_root().escalate(scope.escalate).quiet();
            scope.host.run_best_effort(&cmd);
            Ok(())
        })?;

        self.step(SetupStep::RootQdisc, |scope| {
            scope.checked(scope.qdisc.add_root())
        })?;

        self.step(SetupStep::Filter, |scope| {
            scope.checked(scope.qdisc.add_filter())
        })?;

        self.step(SetupStep::ClassIds, |scope| {
            let escalate = scope.escalate;
            scope.host.write(&scope.group.default_classid(), DEFAULT_CLASSID, escalate)?;
            scope.host.write(&scope.group.scope_classid(), SCOPE_CLASSID, escalate)
        })?;

        info!("netem opts: {}", options.join(" "));
        self.step(SetupStep::Netem, |scope| {
            scope.checked(scope.qdisc.replace_netem(options))
        })?;

        Ok(())
    }

    /// Run the command inside the control group and wait for it to finish.
    ///
    /// The command is never escalated.
    pub fn run(&mut self, argv: &[String]) -> Result<Status> {
        if self.state != State::Prepared {
            bail!("cannot run a command in a scope that is {:?}", self.state);
        }
        if self.host.interrupted() {
            bail!(ErrorKind::Interrupted);
        }

        self.state = State::Running;
        let cmd = self.group.exec(argv);
        self.host.status(&cmd)
    }

    /// Remove the qdisc tree from the device.
    ///
    /// Runs at most once. Failure is logged rather than returned so that it cannot mask the
    /// outcome of the command.
    pub fn teardown(&mut self) {
        let previous = self.state;
        self.state = State::TornDown;
        if previous == State::Idle || previous == State::TornDown {
            return;
        }

        let cmd = self.qdisc.delete_root().escalate(self.escalate);
        match self.host.run(&cmd) {
            Ok(0) => debug!("removed qdisc tree from {}", self.qdisc.device()),
            Ok(code) => warn!(
                "unable to remove netem from {}: '{}' exited with exit code {}",
                self.qdisc.device(),
                cmd,
                code
            ),
            Err(err) => warn!("unable to remove netem from {}: {}", self.qdisc.device(), err),
        }
    }

    fn checked(&mut self, cmd: Invocation) -> Result<()> {
        self.host.run_checked(&cmd.escalate(self.escalate))
    }

    fn step<F>(&mut self, step: SetupStep, action: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if self.host.interrupted() {
            bail!(ErrorKind::Interrupted);
        }

        debug!("setup: {}", step);
        let result = action(self);
        let interrupted = self.host.interrupted();
        result.map_err(|err| {
            if interrupted {
                return Error::with_chain(err, ErrorKind::Interrupted);
            }
            let code = match *err.kind() {
                ErrorKind::CommandFailed(_, code) => Some(code),
                _ => None,
            };
            Error::with_chain(err, ErrorKind::SetupFailed(step, code))
        })
    }
}

impl<'h, H: Host + ?Sized> Drop for Scope<'h, H> {
    fn drop(&mut self) {
        self.teardown();
    }
}
