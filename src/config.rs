//! Connect-time configuration and the `VirtualHere` helper launch hook.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

/// Parameters needed to open a remote-device session: which catalog
/// entry, device type, and method to use, plus the credentials to log
/// in with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDeviceConfig {
    pub service_name: String,
    pub device_type_id: u8,
    pub method_id: u8,
    pub username: String,
    pub password: String,
}

impl RemoteDeviceConfig {
    pub fn new(
        service_name: impl Into<String>,
        device_type_id: u8,
        method_id: u8,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            device_type_id,
            method_id,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// If `method_name` is exactly `"VirtualHere"`, spawn the matching
/// helper binary from `cwd`. Absence of the helper is not an error —
/// logged at `debug` and otherwise ignored.
pub fn maybe_launch_virtualhere_helper(method_name: &str, cwd: &Path) {
    if method_name != "VirtualHere" {
        return;
    }

    let exe = if cfg!(target_pointer_width = "64") {
        "vhui64.exe"
    } else {
        "vhui32.exe"
    };

    let mut command = Command::new(exe);
    command
        .arg("-cvhui.ini")
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match command.spawn() {
        Ok(_) => log::debug!("launched VirtualHere helper {exe}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("VirtualHere helper {exe} not present in {}", cwd.display());
        }
        Err(e) => log::debug!("failed to launch VirtualHere helper {exe}: {e}"),
    }
}
