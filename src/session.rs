//! Top-level control flow of one invocation.

use tracing::{debug, info};

use crate::command::{Host, Status};
use crate::device;
use crate::error::*;
use crate::netem::ImpairmentSpec;
use crate::scope::Scope;

/// Everything requested on the command line and in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Impairments to apply.
    pub spec: ImpairmentSpec,
    /// Device to impair instead of the one routing to `probe`.
    pub interface: Option<String>,
    /// Address whose route selects the device.
    pub probe: String,
    /// Escalate privileges for host configuration.
    pub escalate: bool,
    /// The command to run, program first.
    pub command: Vec<String>,
}

/// A command bound to the device it is impaired on.
///
/// The session is fixed once constructed; the host configuration it makes is reverted exactly
/// once, when [`run`](#method.run) returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    device: String,
    escalate: bool,
    command: Vec<String>,
}

impl Session {
    /// Construct a session running `command` with impairment on `device`.
    pub fn new<S>(device: S, escalate: bool, command: Vec<String>) -> Result<Session>
    where
        S: Into<String>,
    {
        if command.is_empty() {
            bail!(ErrorKind::MissingCommand);
        }

        Ok(Session {
            device: device.into(),
            escalate,
            command,
        })
    }

    /// The impaired device.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Apply the netem options, run the command and revert the host configuration.
    ///
    /// Returns the exit code the process should finish with.
    pub fn run<H: Host + ?Sized>(&self, host: &mut H, options: &[String]) -> Result<i32> {
        let status = {
            let mut scope = Scope::new(&mut *host, self.device.as_str(), self.escalate);
            scope.prepare(options)?;
            debug!("running '{}' with netem on {}", self.command.join(" "), self.device);
            scope.run(&self.command)?
        };

        Ok(exit_code(status, host.interrupted()))
    }
}

/// Run the requested command under impairment.
///
/// The impairment options are checked before anything on the host is queried or changed.
pub fn execute<H: Host + ?Sized>(host: &mut H, request: &Request) -> Result<i32> {
    if request.command.is_empty() {
        bail!(ErrorKind::MissingCommand);
    }

    let options = request.spec.translate()?;
    let interface = request.interface.as_ref().map(String::as_str);
    let device = device::resolve(&mut *host, interface, &request.probe)?;
    let session = Session::new(device, request.escalate, request.command.clone())?;

    let code = session.run(host, &options)?;
    info!("'{}' exited with exit code {}", request.command.join(" "), code);
    Ok(code)
}

fn exit_code(status: Status, interrupted: bool) -> i32 {
    match status {
        Status::Exited(code) => code,
        Status::Signaled(_) if interrupted => 1,
        signaled => signaled.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PROBE_ADDRESS;
    use crate::netem::{Chance, Delay, Distribution};
    use crate::test_helpers::FakeHost;

    fn request(spec: ImpairmentSpec) -> Request {
        Request {
            spec,
            interface: None,
            probe: PROBE_ADDRESS.to_string(),
            escalate: false,
            command: ["ping", "-c", "3", "example.com"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        }
    }

    fn delay() -> ImpairmentSpec {
        ImpairmentSpec {
            delay: Some(Delay::from_values(&["100ms".to_string(), "10ms".to_string()]).unwrap()),
            loss: Some(Chance::new("1%".to_string(), None)),
            ..Default::default()
        }
    }

    fn teardown() -> [&'static str; 6] {
        ["tc", "qdisc", "del", "dev", "eth0", "root"]
    }

    #[test]
    fn child_exit_code_is_propagated_after_teardown() {
        let mut host = FakeHost::new().exit_with(&["cgexec"], Status::Exited(7));
        assert_eq!(execute(&mut host, &request(delay())).unwrap(), 7);
        assert_eq!(host.commands().last().unwrap().argv(), teardown());
    }

    #[test]
    fn invalid_spec_touches_nothing() {
        let spec = ImpairmentSpec {
            distribution: Some(Distribution::Normal),
            ..Default::default()
        };
        let mut host = FakeHost::new();

        let err = execute(&mut host, &request(spec)).unwrap_err();
        match *err.kind() {
            ErrorKind::InvalidSpec(_) => {}
            ref other => panic!("unexpected error {:?}", other),
        }
        assert!(host.commands().is_empty());
        assert!(host.writes().is_empty());
    }

    #[test]
    fn explicit_device_skips_route_query() {
        let mut host = FakeHost::new();
        let request = Request {
            interface: Some("eth1".to_string()),
            ..request(delay())
        };

        assert_eq!(execute(&mut host, &request).unwrap(), 0);
        assert!(host.matching(&["ip"]).is_empty());
        assert_eq!(
            host.commands().last().unwrap().argv(),
            ["tc", "qdisc", "del", "dev", "eth1", "root"]
        );
    }

    #[test]
    fn translated_options_reach_netem() {
        let mut host = FakeHost::new();
        execute(&mut host, &request(delay())).unwrap();

        let replace = host.matching(&["tc", "qdisc", "replace"]);
        assert_eq!(&replace[0].argv()[8..], ["delay", "100ms", "10ms", "loss", "1%"]);
    }

    #[test]
    fn unresolvable_device_touches_nothing() {
        let mut host = FakeHost::new().route("unreachable 8.8.8.8");
        assert!(execute(&mut host, &request(delay())).is_err());
        assert_eq!(host.commands().len(), 1);
    }

    #[test]
    fn interrupted_child_exits_with_one_after_single_teardown() {
        let mut host = FakeHost::new()
            .interrupt_on(&["cgexec"])
            .exit_with(&["cgexec"], Status::Signaled(2));

        assert_eq!(execute(&mut host, &request(delay())).unwrap(), 1);
        assert_eq!(host.matching(&["tc", "qdisc", "del"]).len(), 2);
        assert_eq!(host.commands().last().unwrap().argv(), teardown());
    }

    #[test]
    fn interrupt_during_setup_exits_with_one() {
        let mut host = FakeHost::new()
            .interrupt_on(&["tc", "filter"])
            .exit_with(&["tc", "filter"], Status::Signaled(2));

        let err = execute(&mut host, &request(delay())).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(host.matching(&["cgexec"]).is_empty());
        assert_eq!(host.commands().last().unwrap().argv(), teardown());
    }

    #[test]
    fn child_handling_interrupt_keeps_its_code() {
        let mut host = FakeHost::new()
            .interrupt_on(&["cgexec"])
            .exit_with(&["cgexec"], Status::Exited(0));
        assert_eq!(execute(&mut host, &request(delay())).unwrap(), 0);
    }

    #[test]
    fn killed_child_reports_signal() {
        let mut host = FakeHost::new().exit_with(&["cgexec"], Status::Signaled(9));
        assert_eq!(execute(&mut host, &request(delay())).unwrap(), 137);
    }

    #[test]
    fn setup_failure_propagates_code_and_tears_down() {
        let mut host = FakeHost::new().exit_with(&["modprobe"], Status::Exited(1));
        let err = execute(&mut host, &request(delay())).unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert!(host.matching(&["cgexec"]).is_empty());
        assert_eq!(host.commands().last().unwrap().argv(), teardown());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(Session::new("eth0", false, Vec::new()).is_err());

        let mut host = FakeHost::new();
        let request = Request {
            command: Vec::new(),
            ..request(delay())
        };
        assert!(execute(&mut host, &request).is_err());
        assert!(host.commands().is_empty());
    }
}
