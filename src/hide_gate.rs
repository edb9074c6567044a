//! Device-Hide Gate (spec §4.11, §6.5): a thin wrapper around the
//! external device-hiding driver's CLI. The CLI is invoked as a
//! subprocess and its JSON stdout parsed; no direct driver IOCTL calls
//! are made from this crate.

use crate::error::{AsteriqError, Result};
use std::path::Path;
use std::process::Command;

/// Name of the CLI binary, resolved via `PATH` (spec §6.5).
const CLI_NAME: &str = "HidHideCLI.exe";

pub struct HideGate {
    cli_path: std::path::PathBuf,
}

impl HideGate {
    pub fn new() -> Self {
        Self {
            cli_path: std::path::PathBuf::from(CLI_NAME),
        }
    }

    pub fn with_cli_path(cli_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.cli_path)
            .args(args)
            .output()
            .map_err(|_| AsteriqError::HidHideUnavailable)?;
        if !output.status.success() {
            return Err(AsteriqError::HidHideUnavailable);
        }
        String::from_utf8(output.stdout).map_err(|_| AsteriqError::HidHideUnavailable)
    }

    pub fn hide(&self, device_path: &str) -> Result<()> {
        self.run(&["--device-hide", device_path]).map(|_| ())
    }

    pub fn unhide(&self, device_path: &str) -> Result<()> {
        self.run(&["--device-unhide", device_path]).map(|_| ())
    }

    pub fn list_hidden(&self) -> Result<Vec<String>> {
        let stdout = self.run(&["--device-list", "--json"])?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|_| AsteriqError::HidHideUnavailable)?;
        Ok(value
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    pub fn set_cloaking(&self, enabled: bool) -> Result<()> {
        let flag = if enabled { "--cloak-on" } else { "--cloak-off" };
        self.run(&[flag]).map(|_| ())
    }

    pub fn get_cloaking(&self) -> Result<bool> {
        let stdout = self.run(&["--cloak-state", "--json"])?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|_| AsteriqError::HidHideUnavailable)?;
        Ok(value.get("cloak").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub fn set_inverse(&self, enabled: bool) -> Result<()> {
        let flag = if enabled { "--inverse-on" } else { "--inverse-off" };
        self.run(&[flag]).map(|_| ())
    }

    pub fn get_inverse(&self) -> Result<bool> {
        let stdout = self.run(&["--inverse-state", "--json"])?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|_| AsteriqError::HidHideUnavailable)?;
        Ok(value.get("inverse").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub fn whitelist_app(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run(&["--app-reg", &path_str]).map(|_| ())
    }

    pub fn unwhitelist_app(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run(&["--app-unreg", &path_str]).map(|_| ())
    }

    /// Reconcile this process's own whitelist membership against the
    /// current cloaking mode (spec §4.11): in normal mode, whitelisted
    /// apps *see* hidden devices, so this process must be whitelisted to
    /// see what it just hid from everyone else. In inverse mode the
    /// meaning flips — whitelisted apps are the ones devices stay hidden
    /// *from* — so this process must instead be taken off the whitelist.
    pub fn ensure_self_can_see_devices(&self) -> Result<()> {
        let exe = std::env::current_exe().map_err(|_| AsteriqError::HidHideUnavailable)?;
        if self.get_inverse()? {
            self.unwhitelist_app(&exe)
        } else {
            self.whitelist_app(&exe)
        }
    }
}

impl Default for HideGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cli_reports_unavailable() {
        let gate = HideGate::with_cli_path("this-binary-does-not-exist.exe");
        assert!(matches!(gate.hide("foo"), Err(AsteriqError::HidHideUnavailable)));
    }
}
