//! Errors raised while configuring the host and running the impaired command.

use crate::scope::SetupStep;

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Nix(::nix::Error);
        Config(::toml::de::Error);
    }

    errors {
        /// The impairment parameters cannot be translated.
        InvalidSpec(reason: String) {
            description("invalid impairment specification")
            display("invalid impairment specification: {}", reason)
        }

        /// The network device could not be inferred from the routing table.
        DeviceResolution(reason: String) {
            description("unable to determine network device")
            display("unable to determine network device: {}", reason)
        }

        /// A required external command exited unsuccessfully.
        CommandFailed(argv: Vec<String>, code: i32) {
            description("external command failed")
            display("'{}' exited with exit code {}", argv.join(" "), code)
        }

        /// A step of the impairment setup failed.
        ///
        /// Carries the exit code of the failing command, when there was one.
        SetupFailed(step: SetupStep, code: Option<i32>) {
            description("impairment setup failed")
            display("impairment setup failed while trying to {}", step)
        }

        /// An external command could not be started.
        Spawn(reason: String) {
            description("unable to start external command")
            display("unable to start external command: {}", reason)
        }

        /// No command was given to run.
        MissingCommand {
            description("a command to run is required")
            display("a command to run is required")
        }

        /// A signal arrived before the command produced an exit status.
        Interrupted {
            description("interrupted")
            display("interrupted by signal")
        }
    }
}

impl From<::unshare::Error> for Error {
    fn from(err: ::unshare::Error) -> Error {
        ErrorKind::Spawn(err.to_string()).into()
    }
}

impl Error {
    /// The status the process should exit with after reporting this error.
    pub fn exit_code(&self) -> i32 {
        match *self.kind() {
            ErrorKind::CommandFailed(_, code) if code != 0 => code,
            ErrorKind::SetupFailed(_, Some(code)) if code != 0 => code,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_carries_exit_code() {
        let err: Error = ErrorKind::CommandFailed(vec!["tc".into(), "qdisc".into()], 2).into();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "'tc qdisc' exited with exit code 2");
    }

    #[test]
    fn setup_failure_keeps_cause() {
        let cause: Error = ErrorKind::CommandFailed(vec!["modprobe".into()], 3).into();
        let err = Error::with_chain(cause, ErrorKind::SetupFailed(SetupStep::LoadModule, Some(3)));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.iter().count(), 2);
    }

    #[test]
    fn other_errors_exit_with_one() {
        assert_eq!(Error::from(ErrorKind::Interrupted).exit_code(), 1);
        assert_eq!(Error::from(ErrorKind::InvalidSpec("x".into())).exit_code(), 1);
        assert_eq!(Error::from(ErrorKind::SetupFailed(SetupStep::Mount, None)).exit_code(), 1);
    }
}
