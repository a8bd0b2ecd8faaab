use std::path::PathBuf;

use super::prelude::*;

/// Mount point of the net_cls controller.
pub const CONTROL_DIR: &str = "/sys/fs/cgroup/net_cls";

/// Name of the control group the command runs in.
///
/// The name is shared by every session on the host.
pub const SCOPE_NAME: &str = "netem";

/// Class id of traffic outside the control group (`1:2`, an unimpaired band).
pub const DEFAULT_CLASSID: &str = "0x10002";

/// Class id of traffic inside the control group (`1:1`, the impaired band).
pub const SCOPE_CLASSID: &str = "0x10001";

/// The net_cls control group tagging the command's traffic.
///
/// Each process exists in a control group. Every packet sent by a process in a net_cls control
/// group carries the group's class id, which the traffic control filter on the device uses to
/// select the impaired band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlGroup {
    control_dir: PathBuf,
    name: String,
}

impl ControlGroup {
    /// The control group used for every session.
    pub fn new() -> ControlGroup {
        ControlGroup {
            control_dir: PathBuf::from(CONTROL_DIR),
            name: SCOPE_NAME.to_string(),
        }
    }

    /// Name of the control group.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn control_dir(&self) -> String {
        self.control_dir.display().to_string()
    }

    fn controller(&self) -> String {
        format!("net_cls:{}", self.name)
    }

    /// Load the kernel module implementing the cgroup traffic filter.
    pub fn load_module(&self) -> Invocation {
        Invocation::new(vec!["modprobe", "cls_cgroup"])
    }

    /// Create the controller mount point.
    pub fn make_control_dir(&self) -> Invocation {
        Invocation::new(vec!["mkdir".to_string(), "-p".to_string(), self.control_dir()])
    }

    /// Whether `/proc/mounts` lists the controller at the mount point.
    pub fn is_mounted(&self, mounts: &str) -> bool {
        let entry = format!("net_cls {} cgroup ", self.control_dir());
        mounts.lines().any(|line| line.starts_with(&entry))
    }

    /// Mount the net_cls controller.
    pub fn mount(&self) -> Invocation {
        Invocation::new(vec![
            "mount".to_string(),
            "-t".to_string(),
            "cgroup".to_string(),
            "-o".to_string(),
            "net_cls".to_string(),
            "net_cls".to_string(),
            self.control_dir(),
        ])
    }

    /// Create the control group; succeeds when it already exists.
    pub fn create(&self) -> Invocation {
        Invocation::new(vec!["cgcreate".to_string(), "-g".to_string(), self.controller()])
    }

    /// Hand the membership file to the given user so they may join the group.
    pub fn grant_membership(&self, uid: u32, gid: u32) -> Invocation {
        Invocation::new(vec![
            "chown".to_string(),
            format!("{}:{}", uid, gid),
            self.tasks().display().to_string(),
        ])
    }

    /// Membership file of the control group.
    pub fn tasks(&self) -> PathBuf {
        self.control_dir.join(&self.name).join("tasks")
    }

    /// Class id file applying to processes outside any group.
    pub fn default_classid(&self) -> PathBuf {
        self.control_dir.join("net_cls.classid")
    }

    /// Class id file of the control group.
    pub fn scope_classid(&self) -> PathBuf {
        self.control_dir.join(&self.name).join("net_cls.classid")
    }

    /// Run `argv` as a member of the control group.
    pub fn exec(&self, argv: &[String]) -> Invocation {
        let mut command = vec![
            "cgexec".to_string(),
            "-g".to_string(),
            self.controller(),
            "--".to_string(),
        ];
        command.extend(argv.iter().cloned());
        Invocation::new(command)
    }
}

impl Default for ControlGroup {
    fn default() -> ControlGroup {
        ControlGroup::new()
    }
}
