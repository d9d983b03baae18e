//! Device snapshots
//!
//! A [`DeviceSnapshot`] is rebuilt from scratch on every directory poll and
//! replaces the previous one wholesale.

/// One network interface as seen by the device directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    /// Interface name (e.g. "tun-office")
    pub name: String,

    /// Search domains currently configured on the device
    ///
    /// Captured for diagnostics only; change detection ignores it.
    pub whitelist: Vec<String>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            whitelist: Vec::new(),
        }
    }

    pub fn with_whitelist<I, S>(mut self, whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = whitelist.into_iter().map(Into::into).collect();
        self
    }
}

/// All devices known at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    devices: Vec<Device>,
}

impl DeviceSnapshot {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    /// Interface names in directory order
    pub fn names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl FromIterator<Device> for DeviceSnapshot {
    fn from_iter<T: IntoIterator<Item = Device>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DeviceSnapshot {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

/// Compare two name lists as sets
///
/// Lengths must agree and every name in `a` must appear in `b`. Order is
/// ignored. Duplicates are not counted per name, so `[x, x, y]` equals
/// `[x, y, y]`.
pub fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|name| b.contains(name))
}
