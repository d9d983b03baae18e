// # nmcli Device Backend
//
// This crate implements the nmupdate device directory and device mutator
// on top of NetworkManager's `nmcli` command-line tool.
//
// ## Commands
//
// - Connection check: `nmcli -t -f RUNNING general`
// - Listing: `nmcli -t -f DEVICE device`
// - Search domains: `nmcli -g IP4.DOMAIN device show <dev>`
// - Modification: `nmcli device modify <dev> ipv4.dns-search <a,b,c>`
//
// ## Platform Support
//
// nmcli is only available where NetworkManager runs (Linux). On other
// platforms `connect` fails at startup.

use async_trait::async_trait;
use nmupdate_core::traits::{DeviceDirectory, DeviceMutator, DirectoryDevice, MutationOutput};
use nmupdate_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Default nmcli binary, resolved through `PATH`
pub const DEFAULT_NMCLI: &str = "nmcli";

/// Runs nmcli with a fixed binary path
#[derive(Debug, Clone)]
struct Nmcli {
    program: PathBuf,
}

impl Nmcli {
    async fn output(&self, args: &[&str]) -> Result<Output> {
        debug!(program = %self.program.display(), ?args, "running nmcli");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output)
    }

    /// Run nmcli and return stdout, failing on a non-zero exit
    async fn stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(Error::directory(format!(
                "nmcli {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// NetworkManager device directory backed by nmcli
#[derive(Debug, Clone)]
pub struct NmcliDirectory {
    nmcli: Arc<Nmcli>,
}

impl NmcliDirectory {
    /// Connect to NetworkManager through nmcli at `program`
    ///
    /// # Errors
    ///
    /// Fails if nmcli cannot be run or NetworkManager is not running.
    pub async fn connect(program: impl AsRef<Path>) -> Result<Self> {
        let nmcli = Nmcli {
            program: program.as_ref().to_path_buf(),
        };

        let state = nmcli.stdout(&["-t", "-f", "RUNNING", "general"]).await?;
        if state.trim() != "running" {
            return Err(Error::directory(format!(
                "NetworkManager is not running (state: '{}')",
                state.trim()
            )));
        }

        info!(program = %nmcli.program.display(), "connected to NetworkManager");
        Ok(Self {
            nmcli: Arc::new(nmcli),
        })
    }
}

#[async_trait]
impl DeviceDirectory for NmcliDirectory {
    async fn devices(&self) -> Result<Vec<Box<dyn DirectoryDevice>>> {
        let listing = self.nmcli.stdout(&["-t", "-f", "DEVICE", "device"]).await?;

        Ok(parse_device_list(&listing)
            .into_iter()
            .map(|name| {
                Box::new(NmcliDevice {
                    nmcli: Arc::clone(&self.nmcli),
                    name,
                }) as Box<dyn DirectoryDevice>
            })
            .collect())
    }

    fn directory_name(&self) -> &'static str {
        "nmcli"
    }
}

/// One device from an nmcli listing
pub struct NmcliDevice {
    nmcli: Arc<Nmcli>,
    name: String,
}

#[async_trait]
impl DirectoryDevice for NmcliDevice {
    async fn interface(&self) -> Result<String> {
        if self.name.is_empty() {
            return Err(Error::directory("device listed without an interface name"));
        }
        Ok(self.name.clone())
    }

    async fn ip4_searches(&self) -> Result<Option<Vec<String>>> {
        let text = self
            .nmcli
            .stdout(&["-g", "IP4.DOMAIN", "device", "show", &self.name])
            .await?;
        Ok(parse_multi_value(&text))
    }
}

/// Device mutator running `nmcli device modify`
#[derive(Debug, Clone)]
pub struct NmcliMutator {
    nmcli: Nmcli,
}

impl NmcliMutator {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            nmcli: Nmcli {
                program: program.as_ref().to_path_buf(),
            },
        }
    }
}

impl Default for NmcliMutator {
    fn default() -> Self {
        Self::new(DEFAULT_NMCLI)
    }
}

#[async_trait]
impl DeviceMutator for NmcliMutator {
    async fn set_dns_search(&self, device: &str, domains: &[String]) -> Result<MutationOutput> {
        let joined = domains.join(",");
        let output = self
            .nmcli
            .output(&["device", "modify", device, "ipv4.dns-search", &joined])
            .await
            .map_err(|e| Error::mutator(device, e.to_string()))?;

        let text = combined_output(&output);
        if output.status.success() {
            Ok(MutationOutput::new(text))
        } else {
            Err(Error::mutator(
                device,
                format!("nmcli exited with {}: {}", output.status, text),
            ))
        }
    }

    fn mutator_name(&self) -> &'static str {
        "nmcli"
    }
}

fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim(), stderr.trim()) {
        (out, "") => out.to_string(),
        ("", err) => err.to_string(),
        (out, err) => format!("{out}\n{err}"),
    }
}

/// Parse `nmcli -t -f DEVICE device` output into interface names
///
/// Terse mode escapes `:` and `\` with a backslash.
pub fn parse_device_list(text: &str) -> Vec<String> {
    text.lines()
        .map(unescape_terse)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Parse a `-g` multi-value field (`a | b | c`)
///
/// Returns `None` when the field is empty.
pub fn parse_multi_value(text: &str) -> Option<Vec<String>> {
    let values: Vec<String> = text
        .lines()
        .flat_map(|line| line.split('|'))
        .map(|v| unescape_terse(v.trim()))
        .filter(|v| !v.is_empty())
        .collect();

    if values.is_empty() { None } else { Some(values) }
}

fn unescape_terse(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
