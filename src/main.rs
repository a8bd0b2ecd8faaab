//! `netem-exec` runs a command with [netem](https://man7.org/linux/man-pages/man8/tc-netem.8.html)
//! network impairment applied to the traffic of that command alone.
//!
//! The command is placed in a net_cls control group whose packets are classified into a `netem`
//! qdisc on the network device. Everything else on the host is unaffected. The qdisc is removed
//! when the command exits, fails, or is interrupted.
//!
//! # Configuration file
//!
//! The configuration file can be specified at the command line using the `-f` or `--config-file`
//! flag. Alternatively, the following locations are searched in order:
//!
//! 1. `./netem-exec.toml`
//! 1. `./.netem-exec.toml`
//! 1. `~/.config/netem-exec.toml`
//! 1. `~/.netem-exec.toml`
//! 1. `/etc/netem-exec.toml`
//!
//! # Usage
//!
//! `netem-exec [options] [--] <command>...`
//!
//! Only one `netem-exec` may run on a host at a time.

extern crate docopt;
extern crate netem_exec;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate tracing;
extern crate tracing_subscriber;

use std::process::exit;

use docopt::Docopt;
use tracing::error;
use tracing_subscriber::EnvFilter;

use netem_exec::config::{Configuration, DEFAULT_CONFIG};
use netem_exec::netem::{parse_gap, split_values, Chance, Delay, Distribution, ImpairmentSpec};
use netem_exec::{signal, Request, System};

fn main() {
    let args = Arguments::load();

    if args.flag_default_config {
        print!("{}", DEFAULT_CONFIG);
        exit(0);
    }

    let config = match Configuration::load(args.flag_config_file.as_ref().map(String::as_str)) {
        Ok(config) => config,
        Err(err) => {
            init_logging(false);
            exit(report(&err));
        }
    };

    init_logging(args.flag_quiet || config.quiet);

    if let Err(err) = signal::install() {
        exit(report(&err));
    }

    let mut host = System::new(config.escalation.clone());
    let outcome = args
        .into_request(config)
        .and_then(|request| netem_exec::execute(&mut host, &request));

    match outcome {
        Ok(code) => exit(code),
        Err(err) => exit(report(&err)),
    }
}

const USAGE: &'static str = "
Run a command with netem impairment applied to its network traffic. Values of an option are
separated by commas or whitespace.

Usage:
    netem-exec [options] [--] <command>...
    netem-exec (-v | -h | -d)

Impairment options:
    --delay <delay>          TIME [JITTER [CORRELATION]], e.g. --delay 100ms,10ms
    --distribution <name>    Delay distribution: uniform, normal, pareto or paretonormal.
                             Requires --delay.
    --loss <loss>            PERCENT [CORRELATION], e.g. --loss 1%
    --duplicate <dup>        PERCENT [CORRELATION], e.g. --duplicate 0.1%
    --corrupt <corrupt>      PERCENT [CORRELATION], e.g. --corrupt 0.1%
    --gap <distance>         Reorder every DISTANCE-th packet, e.g. --gap 5
    --rate <rate>            Bandwidth limit, e.g. --rate 1mbit
    --reorder <reorder>      PERCENT [CORRELATION], e.g. --reorder 25%. Requires --delay.

Options:
    -i <dev>, --interface <dev>      Network device to impair (default: the device routing
                                     to the probe address).
    -s, --sudo                       Escalate host configuration commands with sudo and run
                                     the command as the calling user.
    -q, --quiet                      Only report warnings and errors.
    -f <file>, --config-file <file>  Location of configuration file to use.
    -h, --help                       Show this help.
    -v, --version                    Show the version.
    -d, --default-config             Dump the default configuration to stdout.
";

#[derive(Deserialize)]
struct Arguments {
    flag_delay: Option<String>,
    flag_distribution: Option<String>,
    flag_loss: Option<String>,
    flag_duplicate: Option<String>,
    flag_corrupt: Option<String>,
    flag_gap: Option<String>,
    flag_rate: Option<String>,
    flag_reorder: Option<String>,
    flag_interface: Option<String>,
    flag_sudo: bool,
    flag_quiet: bool,
    flag_config_file: Option<String>,
    flag_default_config: bool,
    arg_command: Vec<String>,
}

impl Arguments {
    /// Load arguments from the command line.
    fn load() -> Arguments {
        Docopt::new(USAGE)
            .unwrap_or_else(|e| e.exit())
            .help(true)
            .version(Some(version()))
            .options_first(true)
            .deserialize()
            .unwrap_or_else(|e| e.exit())
    }

    /// Combine the arguments with the configuration file.
    fn into_request(self, config: Configuration) -> netem_exec::Result<Request> {
        let spec = self.spec()?;
        Ok(Request {
            spec,
            interface: self.flag_interface.or(config.interface),
            probe: config.probe,
            escalate: self.flag_sudo || config.escalate,
            command: without_separator(self.arg_command),
        })
    }

    /// The impairments requested.
    fn spec(&self) -> netem_exec::Result<ImpairmentSpec> {
        let chance = |option: &str, argument: &Option<String>| match *argument {
            Some(ref argument) => Chance::from_values(option, &split_values(argument)).map(Some),
            None => Ok(None),
        };

        Ok(ImpairmentSpec {
            delay: match self.flag_delay {
                Some(ref delay) => Some(Delay::from_values(&split_values(delay))?),
                None => None,
            },
            distribution: match self.flag_distribution {
                Some(ref name) => Some(name.trim().parse::<Distribution>()?),
                None => None,
            },
            loss: chance("loss", &self.flag_loss)?,
            duplicate: chance("duplicate", &self.flag_duplicate)?,
            corrupt: chance("corrupt", &self.flag_corrupt)?,
            gap: match self.flag_gap {
                Some(ref gap) => Some(parse_gap(gap.trim())?),
                None => None,
            },
            rate: self.flag_rate.as_ref().map(|rate| rate.trim().to_string()),
            reorder: chance("reorder", &self.flag_reorder)?,
        })
    }
}

/// Drop a leading `--` left in the command.
fn without_separator(mut command: Vec<String>) -> Vec<String> {
    if command.first().map(String::as_str) == Some("--") {
        command.remove(0);
    }
    command
}

/// Install the log subscriber, writing to stderr.
fn init_logging(quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if quiet { "warn" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Log an error with its causes and return the exit code for it.
fn report(err: &netem_exec::Error) -> i32 {
    error!("{}", err);
    for cause in err.iter().skip(1) {
        error!("caused by: {}", cause);
    }
    err.exit_code()
}

/// Construct the version string for the program.
fn version() -> String {
    format!(
        "{} - {}\n{}\n\n{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS"),
        env!("CARGO_PKG_DESCRIPTION"),
    )
}
