//! Selection of the network device to impair.

use tracing::info;

use crate::command::{Host, Invocation};
use crate::error::*;

/// Address whose route determines the default device.
pub const PROBE_ADDRESS: &str = "8.8.8.8";

/// Determine the network device to impair.
///
/// An explicit device is used as given. Otherwise the device is the one the host would use to
/// reach `probe`.
pub fn resolve<H>(host: &mut H, explicit: Option<&str>, probe: &str) -> Result<String>
where
    H: Host + ?Sized,
{
    if let Some(device) = explicit {
        return Ok(device.to_string());
    }

    let query = Invocation::new(vec!["ip", "route", "get", probe]);
    let (status, stdout) = host
        .output(&query)
        .chain_err(|| ErrorKind::DeviceResolution(format!("unable to run '{}'", query)))?;
    if !status.success() {
        bail!(ErrorKind::DeviceResolution(format!(
            "'{}' exited with exit code {}",
            query,
            status.code()
        )));
    }

    let device = parse_route(&stdout)?;
    info!("Using network interface: {}", device);
    Ok(device)
}

/// Extract the outbound device from the output of `ip route get`.
pub fn parse_route(route: &str) -> Result<String> {
    let mut tokens = route.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "dev" {
            return match tokens.next() {
                Some(device) => Ok(device.to_string()),
                None => bail!(ErrorKind::DeviceResolution("route ends after 'dev'".into())),
            };
        }
    }

    bail!(ErrorKind::DeviceResolution(format!(
        "no device in route '{}'",
        route.trim()
    )))
}
