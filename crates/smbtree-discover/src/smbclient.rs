//! Samba client process wrapper.
//!
//! Implements [`DirectoryEnumerator`] by running `nmblookup` and `smbclient`
//! as child processes via `tokio::process::Command` and parsing their
//! grepable (`-g`) and `ls` output. Children are killed when the calling
//! future is dropped, which is how job cancellation reaches them.

use std::net::IpAddr;
use std::process::Output;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use smbtree_core::{Credentials, NetworkError, ProcessKind};

use crate::config::DiscoverConfig;
use crate::enumerator::{DirectoryEnumerator, EnumerationRequest, Entry, PrintRequest};
use crate::error::{DiscoverError, Result};

/// Wrapper around the `smbclient` and `nmblookup` binaries.
#[derive(Debug, Clone)]
pub struct SmbClientEnumerator {
    smbclient_path: String,
    nmblookup_path: String,
    timeout: Duration,
}

impl SmbClientEnumerator {
    pub fn new(smbclient_path: &str, nmblookup_path: &str, timeout: Duration) -> Self {
        Self {
            smbclient_path: smbclient_path.to_string(),
            nmblookup_path: nmblookup_path.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &DiscoverConfig) -> Self {
        Self::new(
            &config.smbclient_path,
            &config.nmblookup_path,
            Duration::from_secs(config.command_timeout_secs),
        )
    }

    /// Verify smbclient is installed and return its version line.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = self.run(&self.smbclient_path, &["--version".to_string()], None).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, program: &str, args: &[String], password: Option<&str>) -> Result<Output> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        if let Some(password) = password {
            command.env("PASSWD", password);
        }

        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DiscoverError::CommandNotFound {
                    command: program.to_string(),
                });
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::warn!(command = %program, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(NetworkError::HostUnreachable.into());
            }
        };

        tracing::debug!(
            command = %program,
            args = ?args,
            status = ?output.status.code(),
            duration_ms = start.elapsed().as_millis(),
            "Command finished"
        );
        Ok(output)
    }

    /// Run smbclient and fail on a non-zero exit or a reported NT status.
    async fn smbclient(&self, args: Vec<String>, credentials: &Credentials) -> Result<String> {
        let mut args = args;
        let password = match credentials.login.as_deref().filter(|l| !l.is_empty()) {
            Some(login) => {
                args.push("-U".to_string());
                args.push(login.to_string());
                Some(credentials.password.as_deref().unwrap_or(""))
            }
            None => {
                args.push("-N".to_string());
                None
            }
        };

        let output = self.run(&self.smbclient_path, &args, password).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(command_error(&stdout, &stderr).into());
        }
        if let Some(status) = find_nt_status(&stdout) {
            return Err(map_nt_status(status).into());
        }
        Ok(stdout)
    }

    /// IPs of master browsers answering for `name` (`-` for any workgroup).
    async fn master_browsers(&self, name: &str) -> Result<Vec<IpAddr>> {
        let args = vec!["-M".to_string(), "--".to_string(), name.to_string()];
        let output = self.run(&self.nmblookup_path, &args, None).await?;
        Ok(parse_nmblookup(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn lookup_domains(&self, request: &EnumerationRequest) -> Result<Vec<Entry>> {
        let mut masters = self.master_browsers("-").await?;
        if let Some(max) = request.max_master_browsers {
            masters.truncate(max);
        }
        tracing::debug!(masters = masters.len(), "Master browsers found");

        let mut entries: Vec<Entry> = Vec::new();
        let mut last_error = None;
        for ip in &masters {
            let args = vec!["-L".to_string(), format!("//{ip}"), "-g".to_string()];
            match self.smbclient(args, &request.credentials).await {
                Ok(stdout) => {
                    for entry in parse_grepable(&stdout) {
                        let Entry::Workgroup { name, .. } = &entry else {
                            continue;
                        };
                        if !entries.iter().any(|e| e.name().eq_ignore_ascii_case(name)) {
                            entries.push(entry);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(master = %ip, error = %e, "Master browser did not answer");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if entries.is_empty() => Err(e),
            _ => Ok(entries),
        }
    }

    async fn lookup_members(&self, request: &EnumerationRequest) -> Result<Vec<Entry>> {
        let workgroup = request
            .address
            .workgroup
            .clone()
            .ok_or(NetworkError::InvalidAddress)?;
        let ip = match request.ip {
            Some(ip) => ip,
            None => self
                .master_browsers(&workgroup)
                .await?
                .into_iter()
                .next()
                .ok_or(NetworkError::NotFound)?,
        };

        let args = vec![
            "-L".to_string(),
            format!("//{ip}"),
            "-W".to_string(),
            workgroup,
            "-g".to_string(),
        ];
        let stdout = self.smbclient(args, &request.credentials).await?;
        Ok(parse_grepable(&stdout)
            .into_iter()
            .filter(|e| matches!(e, Entry::Server { .. }))
            .collect())
    }

    async fn lookup_shares(&self, request: &EnumerationRequest) -> Result<Vec<Entry>> {
        let host = request.address.host.clone().ok_or(NetworkError::InvalidAddress)?;
        let mut args = vec!["-L".to_string(), format!("//{host}"), "-g".to_string()];
        push_scope_args(&mut args, request);

        let stdout = self.smbclient(args, &request.credentials).await?;
        Ok(parse_grepable(&stdout)
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Entry::FileShare { .. } | Entry::PrinterShare { .. } | Entry::IpcShare { .. }
                )
            })
            .collect())
    }

    async fn lookup_files(&self, request: &EnumerationRequest) -> Result<Vec<Entry>> {
        let (Some(host), Some(share)) = (&request.address.host, &request.address.share) else {
            return Err(NetworkError::InvalidAddress.into());
        };
        let path = request.address.path.as_deref().unwrap_or("");
        let mut args = vec![
            format!("//{host}/{share}"),
            "-c".to_string(),
            ls_command(path),
        ];
        push_scope_args(&mut args, request);

        let stdout = self.smbclient(args, &request.credentials).await?;
        Ok(parse_ls(&stdout))
    }
}

#[async_trait]
impl DirectoryEnumerator for SmbClientEnumerator {
    async fn enumerate(&self, request: &EnumerationRequest) -> Result<Vec<Entry>> {
        tracing::info!(target = %request.address, process = %request.process, "Enumerating");
        match request.process {
            ProcessKind::LookupDomains => self.lookup_domains(request).await,
            ProcessKind::LookupDomainMembers => self.lookup_members(request).await,
            ProcessKind::LookupShares => self.lookup_shares(request).await,
            ProcessKind::LookupFiles => self.lookup_files(request).await,
            ProcessKind::PrintFile | ProcessKind::WakeUp => {
                Err(NetworkError::InvalidAddress.into())
            }
        }
    }

    async fn print(&self, request: &PrintRequest) -> Result<()> {
        let share = &request.share;
        let file = request.file.to_string_lossy().replace('"', "");
        for copy in 1..=request.copies.max(1) {
            let mut args = vec![
                share.unc(),
                "-c".to_string(),
                format!("print \"{file}\""),
                "-W".to_string(),
                share.workgroup.clone(),
            ];
            if let Some(ip) = share.host_ip {
                args.push("-I".to_string());
                args.push(ip.to_string());
            }
            self.smbclient(args, &share.credentials).await?;
            tracing::debug!(printer = %share.unc(), copy, "Copy sent");
        }
        Ok(())
    }
}

fn push_scope_args(args: &mut Vec<String>, request: &EnumerationRequest) {
    if let Some(workgroup) = &request.address.workgroup {
        args.push("-W".to_string());
        args.push(workgroup.clone());
    }
    if let Some(ip) = request.ip {
        args.push("-I".to_string());
        args.push(ip.to_string());
    }
}

/// `ls "dir\sub\*"` for a share-relative `/` path.
fn ls_command(path: &str) -> String {
    let path = path.replace('"', "").replace('/', "\\");
    let path = path.trim_matches('\\');
    if path.is_empty() {
        "ls \"*\"".to_string()
    } else {
        format!("ls \"{path}\\*\"")
    }
}

/// Master browser IPs from `nmblookup -M` output, in answer order.
pub fn parse_nmblookup(stdout: &str) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for line in stdout.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(first), Some(second)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if !second.contains('<') {
            continue;
        }
        if let Ok(ip) = first.parse::<IpAddr>() {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    ips
}

/// Entries from `smbclient -L -g` output (`Type|Name|Comment` lines).
pub fn parse_grepable(stdout: &str) -> Vec<Entry> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '|');
            let kind = fields.next()?.trim();
            let name = fields.next()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let comment = fields
                .next()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty());

            let entry = match kind {
                "Disk" => Entry::FileShare { name, comment },
                "Printer" => Entry::PrinterShare { name, comment },
                "IPC" => Entry::IpcShare { name, comment },
                "Server" => Entry::Server {
                    name,
                    comment,
                    ip: None,
                },
                "Workgroup" => Entry::Workgroup {
                    name,
                    master_browser: comment,
                    master_ip: None,
                },
                _ => return None,
            };
            Some(entry)
        })
        .collect()
}

/// Entries from smbclient `ls` output.
///
/// Lines look like `  name  DA  1234  Mon Jan  1 10:00:00 2024`; the name
/// may contain spaces, the trailing seven fields never do.
pub fn parse_ls(stdout: &str) -> Vec<Entry> {
    const ATTRIBUTES: &str = "DAHSRNVL";

    stdout
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 8 {
                return None;
            }
            let attributes = tokens[tokens.len() - 7];
            let size = tokens[tokens.len() - 6];
            if !attributes.chars().all(|c| ATTRIBUTES.contains(c)) || size.parse::<u64>().is_err() {
                return None;
            }

            let name = tokens[..tokens.len() - 7].join(" ");
            if name == "." || name == ".." {
                return None;
            }
            Some(if attributes.contains('L') {
                Entry::UnsupportedLink { name }
            } else if attributes.contains('D') {
                Entry::Directory { name }
            } else {
                Entry::File { name }
            })
        })
        .collect()
}

fn find_nt_status(text: &str) -> Option<&str> {
    text.split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .find(|token| token.starts_with("NT_STATUS_"))
}

fn command_error(stdout: &str, stderr: &str) -> NetworkError {
    if let Some(status) = find_nt_status(stderr).or_else(|| find_nt_status(stdout)) {
        return map_nt_status(status);
    }
    let message = stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("command failed");
    NetworkError::Unknown(message.to_string())
}

/// Map an `NT_STATUS_*` code onto the error taxonomy.
pub fn map_nt_status(status: &str) -> NetworkError {
    match status.trim_start_matches("NT_STATUS_") {
        "ACCESS_DENIED" | "LOGON_FAILURE" | "WRONG_PASSWORD" | "NO_SUCH_USER" => {
            NetworkError::AccessDenied
        }
        "ACCOUNT_DISABLED" | "ACCOUNT_LOCKED_OUT" | "PASSWORD_EXPIRED"
        | "PASSWORD_MUST_CHANGE" | "NOT_SUPPORTED" | "SHARING_VIOLATION" => {
            NetworkError::NotPermitted
        }
        "BAD_NETWORK_NAME" | "OBJECT_NAME_NOT_FOUND" | "OBJECT_PATH_NOT_FOUND"
        | "NO_SUCH_FILE" | "NOT_FOUND" => NetworkError::NotFound,
        "HOST_UNREACHABLE" | "NETWORK_UNREACHABLE" | "CONNECTION_REFUSED" | "IO_TIMEOUT"
        | "CONNECTION_RESET" | "CONNECTION_DISCONNECTED" | "BAD_NETWORK_PATH" => {
            NetworkError::HostUnreachable
        }
        "NOT_A_DIRECTORY" => NetworkError::NotADirectory,
        "NO_MEMORY" | "INSUFFICIENT_RESOURCES" => NetworkError::OutOfMemory,
        "INVALID_PARAMETER" | "OBJECT_NAME_INVALID" | "INVALID_COMPUTER_NAME" => {
            NetworkError::InvalidAddress
        }
        _ => NetworkError::Unknown(status.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_parse_grepable_listing() {
        let stdout = "\
Disk|DATA|Team data
Disk|ADMIN$|Remote Admin
IPC|IPC$|IPC Service (Samba)
Printer|LASER|
Server|SRV1|File server
Workgroup|WG1|SRV1
garbage line
";
        let entries = parse_grepable(stdout);
        assert_eq!(entries.len(), 6);
        assert_eq!(
            entries[0],
            Entry::FileShare {
                name: "DATA".into(),
                comment: Some("Team data".into())
            }
        );
        assert_eq!(
            entries[3],
            Entry::PrinterShare {
                name: "LASER".into(),
                comment: None
            }
        );
        assert_eq!(
            entries[5],
            Entry::Workgroup {
                name: "WG1".into(),
                master_browser: Some("SRV1".into()),
                master_ip: None
            }
        );
    }

    #[test]
    fn test_parse_ls_listing() {
        let stdout = "\
  .                                   D        0  Mon Jan  1 10:00:00 2024
  ..                                  D        0  Mon Jan  1 10:00:00 2024
  docs                                D        0  Mon Jan  1 10:00:00 2024
  Annual Report.pdf                   A   123456  Tue Feb 13 09:30:12 2024
  hidden.txt                         AH       12  Tue Feb 13 09:30:12 2024

\t\t48254668 blocks of size 1024. 12345678 blocks available
";
        let entries = parse_ls(stdout);
        assert_eq!(
            entries,
            vec![
                Entry::Directory {
                    name: "docs".into()
                },
                Entry::File {
                    name: "Annual Report.pdf".into()
                },
                Entry::File {
                    name: "hidden.txt".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_nmblookup_masters() {
        let stdout = "\
querying __MSBROWSE__ on 192.168.1.255
192.168.1.10 __MSBROWSE__<01>
192.168.1.20 __MSBROWSE__<01>
192.168.1.10 __MSBROWSE__<01>
";
        assert_eq!(
            parse_nmblookup(stdout),
            vec![
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            ]
        );
    }

    #[test]
    fn test_nt_status_mapping() {
        assert_eq!(map_nt_status("NT_STATUS_ACCESS_DENIED"), NetworkError::AccessDenied);
        assert_eq!(map_nt_status("NT_STATUS_LOGON_FAILURE"), NetworkError::AccessDenied);
        assert_eq!(map_nt_status("NT_STATUS_BAD_NETWORK_NAME"), NetworkError::NotFound);
        assert_eq!(
            map_nt_status("NT_STATUS_HOST_UNREACHABLE"),
            NetworkError::HostUnreachable
        );
        assert_eq!(map_nt_status("NT_STATUS_NOT_A_DIRECTORY"), NetworkError::NotADirectory);
        assert_eq!(
            map_nt_status("NT_STATUS_FOO"),
            NetworkError::Unknown("NT_STATUS_FOO".into())
        );
    }

    #[test]
    fn test_command_error_prefers_status() {
        let err = command_error(
            "",
            "session setup failed: NT_STATUS_LOGON_FAILURE\n",
        );
        assert_eq!(err, NetworkError::AccessDenied);
        let err = command_error("", "Connection to srv failed\n\n");
        assert_eq!(err, NetworkError::Unknown("Connection to srv failed".into()));
    }

    #[test]
    fn test_ls_command_paths() {
        assert_eq!(ls_command(""), "ls \"*\"");
        assert_eq!(ls_command("docs/2024"), "ls \"docs\\2024\\*\"");
    }

    #[tokio::test]
    async fn test_missing_binary_is_command_not_found() {
        let enumerator = SmbClientEnumerator::new(
            "/nonexistent/smbclient",
            "/nonexistent/nmblookup",
            Duration::from_secs(5),
        );
        let err = enumerator.verify_installation().await.unwrap_err();
        assert!(matches!(err, DiscoverError::CommandNotFound { .. }));
    }
}
