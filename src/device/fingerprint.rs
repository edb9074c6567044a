//! Stable device identity.
//!
//! Adapted from the teacher's `device.rs`: a per-instance path is the
//! strongest identity signal, falling back to a serial number, falling
//! back to a bare vendor:product pair for devices that expose neither.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub path: Option<String>,
}

impl DeviceFingerprint {
    /// Stable key used as the device id throughout the crate.
    ///
    /// Priority: serial number, then a short path-derived tag, then a bare
    /// `vid:pid`. Path is preferred as input to `enumerate()`'s identity
    /// reconciliation (spec §4.1), but the fingerprint string itself stays
    /// serial-first so that it survives a device moving USB ports.
    pub fn to_string(&self) -> String {
        if let Some(serial) = &self.serial_number {
            if !serial.is_empty() {
                return format!("{:04x}:{:04x}:{}", self.vendor_id, self.product_id, serial);
            }
        }
        if let Some(path) = &self.path {
            let tag = path.rsplit(['\\', '/']).next().unwrap_or(path);
            return format!("{:04x}:{:04x}:{}", self.vendor_id, self.product_id, tag);
        }
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }

    pub fn path_key(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_takes_priority_over_path() {
        let fp = DeviceFingerprint {
            vendor_id: 0x231d,
            product_id: 0x0200,
            serial_number: Some("ABC123".into()),
            path: Some(r"\\?\hid#vid_231d&pid_0200#7&abc".into()),
        };
        assert_eq!(fp.to_string(), "231d:0200:ABC123");
    }

    #[test]
    fn falls_back_to_vid_pid_only() {
        let fp = DeviceFingerprint {
            vendor_id: 0x045e,
            product_id: 0x0000,
            serial_number: None,
            path: None,
        };
        assert_eq!(fp.to_string(), "045e:0000");
    }
}
