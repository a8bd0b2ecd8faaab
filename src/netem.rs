//! Impairment parameters and their translation into `netem` options.
//!
//! The values themselves (`100ms`, `1%`, `10mbit`, ...) are passed through to `tc` untouched;
//! only the combination of options is checked here.

use std::fmt;
use std::str::FromStr;

use crate::error::*;

/// Packet delay, optionally varied by a jitter term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delay {
    /// Base delay added to every packet.
    pub time: String,
    /// Random variation of the delay.
    pub jitter: Option<Jitter>,
}

/// Random variation of a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jitter {
    /// Magnitude of the variation.
    pub time: String,
    /// Correlation with the previous packet's delay.
    pub correlation: Option<String>,
}

/// A probability applied per packet, with an optional correlation term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chance {
    /// Probability of the event.
    pub percent: String,
    /// Correlation with the previous packet.
    pub correlation: Option<String>,
}

/// Shape of the delay distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// `uniform`
    Uniform,
    /// `normal`
    Normal,
    /// `pareto`
    Pareto,
    /// `paretonormal`
    ParetoNormal,
}

/// The complete set of impairments applied to the command's traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpairmentSpec {
    /// Added latency.
    pub delay: Option<Delay>,
    /// Requires `delay`.
    pub distribution: Option<Distribution>,
    /// Packets dropped.
    pub loss: Option<Chance>,
    /// Packets sent twice.
    pub duplicate: Option<Chance>,
    /// Packets with a flipped bit.
    pub corrupt: Option<Chance>,
    /// Reorder every n-th packet.
    pub gap: Option<u32>,
    /// Bandwidth limit, e.g. `1mbit`.
    pub rate: Option<String>,
    /// Requires `delay`.
    pub reorder: Option<Chance>,
}

impl Delay {
    /// Build a delay from `TIME [JITTER [CORRELATION]]`.
    pub fn from_values(values: &[String]) -> Result<Delay> {
        let (time, jitter, correlation) = match values {
            [time] => (time, None, None),
            [time, jitter] => (time, Some(jitter), None),
            [time, jitter, correlation] => (time, Some(jitter), Some(correlation)),
            _ => bail!(arity("delay", "TIME [JITTER [CORRELATION]]", values)),
        };

        Ok(Delay {
            time: time.clone(),
            jitter: jitter.map(|time| Jitter {
                time: time.clone(),
                correlation: correlation.cloned(),
            }),
        })
    }

    fn tokens(&self) -> Vec<String> {
        let mut tokens = vec![self.time.clone()];
        if let Some(ref jitter) = self.jitter {
            tokens.push(jitter.time.clone());
            tokens.extend(jitter.correlation.iter().cloned());
        }
        tokens
    }
}

impl Chance {
    /// Build a chance from `PERCENT [CORRELATION]`.
    pub fn from_values(option: &str, values: &[String]) -> Result<Chance> {
        match values {
            [percent] => Ok(Chance::new(percent.clone(), None)),
            [percent, correlation] => Ok(Chance::new(percent.clone(), Some(correlation.clone()))),
            _ => bail!(arity(option, "PERCENT [CORRELATION]", values)),
        }
    }

    /// A chance with an optional correlation.
    pub fn new(percent: String, correlation: Option<String>) -> Chance {
        Chance { percent, correlation }
    }

    fn tokens(&self) -> Vec<String> {
        let mut tokens = vec![self.percent.clone()];
        tokens.extend(self.correlation.iter().cloned());
        tokens
    }
}

fn arity(option: &str, usage: &str, values: &[String]) -> ErrorKind {
    ErrorKind::InvalidSpec(format!(
        "--{} expects {}, got {} value(s)",
        option,
        usage,
        values.len()
    ))
}

impl Distribution {
    /// The name `tc` knows the distribution table by.
    pub fn name(&self) -> &'static str {
        match *self {
            Distribution::Uniform => "uniform",
            Distribution::Normal => "normal",
            Distribution::Pareto => "pareto",
            Distribution::ParetoNormal => "paretonormal",
        }
    }
}

impl FromStr for Distribution {
    type Err = Error;

    fn from_str(name: &str) -> Result<Distribution> {
        match name {
            "uniform" => Ok(Distribution::Uniform),
            "normal" => Ok(Distribution::Normal),
            "pareto" => Ok(Distribution::Pareto),
            "paretonormal" => Ok(Distribution::ParetoNormal),
            other => bail!(ErrorKind::InvalidSpec(format!(
                "unknown distribution '{}', expected one of uniform, normal, pareto, paretonormal",
                other
            ))),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse the distance of `--gap`.
pub fn parse_gap(value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(gap) if gap > 0 => Ok(gap),
        _ => bail!(ErrorKind::InvalidSpec(format!(
            "--gap expects a positive integer, got '{}'",
            value
        ))),
    }
}

/// Split an option argument into its values.
///
/// Values may be separated by whitespace or commas: `"100ms 10ms"` and `"100ms,10ms"` are
/// equivalent.
pub fn split_values(argument: &str) -> Vec<String> {
    argument
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|value| !value.is_empty())
        .map(String::from)
        .collect()
}

impl ImpairmentSpec {
    /// Check the combination of options.
    pub fn validate(&self) -> Result<()> {
        if self.delay.is_none() {
            if self.distribution.is_some() {
                bail!(ErrorKind::InvalidSpec("--distribution requires --delay".into()));
            }
            if self.reorder.is_some() {
                bail!(ErrorKind::InvalidSpec("--reorder requires --delay".into()));
            }
        }
        Ok(())
    }

    /// Translate into the options following `netem` on the `tc` command line.
    ///
    /// Options are always emitted in the order delay, distribution, loss, duplicate, corrupt,
    /// gap, rate, reorder.
    pub fn translate(&self) -> Result<Vec<String>> {
        self.validate()?;

        let mut tokens = Vec::new();
        let mut option = |keyword: &str, values: Vec<String>| {
            tokens.push(keyword.to_string());
            tokens.extend(values);
        };

        if let Some(ref delay) = self.delay {
            option("delay", delay.tokens());
        }
        if let Some(distribution) = self.distribution {
            option("distribution", vec![distribution.name().to_string()]);
        }
        if let Some(ref loss) = self.loss {
            option("loss", loss.tokens());
        }
        if let Some(ref duplicate) = self.duplicate {
            option("duplicate", duplicate.tokens());
        }
        if let Some(ref corrupt) = self.corrupt {
            option("corrupt", corrupt.tokens());
        }
        if let Some(gap) = self.gap {
            option("gap", vec![gap.to_string()]);
        }
        if let Some(ref rate) = self.rate {
            option("rate", vec![rate.clone()]);
        }
        if let Some(ref reorder) = self.reorder {
            option("reorder", reorder.tokens());
        }

        Ok(tokens)
    }
}
