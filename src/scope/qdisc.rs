use super::prelude::*;

/// Handle of the root priority qdisc.
pub const ROOT_HANDLE: &str = "1:";

/// Band of the root qdisc that receives the control group's traffic.
pub const IMPAIRED_BAND: &str = "1:1";

/// The traffic control tree installed on a network device.
///
/// A `prio` qdisc sits at the root of the device. A cgroup filter sorts each packet into a band
/// by the class id of the sending process, and the band for the control group holds a `netem`
/// qdisc. Deleting the root removes the whole tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qdisc {
    device: String,
}

impl Qdisc {
    /// The tree on the given device.
    pub fn new<S: Into<String>>(device: S) -> Qdisc {
        Qdisc { device: device.into() }
    }

    /// Name of the device.
    pub fn device(&self) -> &str {
        &self.device
    }

    fn tc(&self, object: &str, action: &str) -> Vec<String> {
        vec![
            "tc".to_string(),
            object.to_string(),
            action.to_string(),
            "dev".to_string(),
            self.device.clone(),
        ]
    }

    /// Remove the root qdisc and everything attached beneath it.
    pub fn delete_root(&self) -> Invocation {
        let mut argv = self.tc("qdisc", "del");
        argv.push("root".to_string());
        Invocation::new(argv)
    }

    /// Install the root priority qdisc.
    pub fn add_root(&self) -> Invocation {
        let mut argv = self.tc("qdisc", "add");
        argv.extend(vec!["root", "handle", ROOT_HANDLE, "prio"].into_iter().map(String::from));
        Invocation::new(argv)
    }

    /// Install the filter classifying packets by control group.
    pub fn add_filter(&self) -> Invocation {
        let mut argv = self.tc("filter", "add");
        argv.extend(vec!["handle", IMPAIRED_BAND, "cgroup"].into_iter().map(String::from));
        Invocation::new(argv)
    }

    /// Create or update the netem qdisc of the impaired band.
    pub fn replace_netem(&self, options: &[String]) -> Invocation {
        let mut argv = self.tc("qdisc", "replace");
        argv.extend(vec!["parent", IMPAIRED_BAND, "netem"].into_iter().map(String::from));
        argv.extend(options.iter().cloned());
        Invocation::new(argv)
    }
}
