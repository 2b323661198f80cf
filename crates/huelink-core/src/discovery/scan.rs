// ── Local subnet sweep ──
//
// Fallback when the cloud directory does not know the bridge: ping every
// address of the local /24 and validate whoever answers.

use std::future::Future;
use std::net::{Ipv4Addr, UdpSocket};
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Hosts per ping task.
pub const PING_BATCH: usize = 3;
/// Hosts per validation task.
pub const VALIDATE_BATCH: usize = 2;

/// The host's LAN address: first line of `ip_file` when it exists,
/// otherwise the source address the OS picks for an outbound route.
pub fn local_ip(ip_file: Option<&Path>) -> Result<Ipv4Addr, CoreError> {
    if let Some(path) = ip_file.filter(|p| p.exists()) {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::LocalAddress {
            reason: format!("{}: {e}", path.display()),
        })?;
        let line = content.lines().next().unwrap_or_default().trim();
        if line.is_empty() {
            return Err(CoreError::LocalAddress {
                reason: format!("{} is empty", path.display()),
            });
        }
        return line.parse().map_err(|e| CoreError::LocalAddress {
            reason: format!("'{line}': {e}"),
        });
    }

    // No packet is sent: connecting a UDP socket only selects a route.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(local_err)?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 80)).map_err(local_err)?;
    match socket.local_addr().map_err(local_err)?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => Err(CoreError::LocalAddress {
            reason: format!("no usable IPv4 route (got {other})"),
        }),
    }
}

fn local_err(e: std::io::Error) -> CoreError {
    CoreError::LocalAddress {
        reason: e.to_string(),
    }
}

/// `.1` through `.255` of the local /24, without the local address.
pub fn ip_range(local: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, _] = local.octets();
    (1..=255)
        .map(|d| Ipv4Addr::new(a, b, c, d))
        .filter(|ip| *ip != local)
        .collect()
}

/// Two ICMP echoes with a two-second reply timeout.
pub async fn ping(host: Ipv4Addr) -> bool {
    let status = Command::new("ping")
        .args(["-c", "2", "-W", "2"])
        .arg(host.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    matches!(status, Ok(s) if s.success())
}

/// Run `check` over `hosts` in concurrent tasks of `batch` hosts each and
/// return every host that passed. All tasks are joined before returning.
pub async fn fan_out<T, F, Fut>(hosts: Vec<T>, batch: usize, check: F) -> Vec<T>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    let mut tasks = JoinSet::new();
    for chunk in hosts.chunks(batch.max(1)) {
        let chunk = chunk.to_vec();
        let check = check.clone();
        tasks.spawn(async move {
            let mut passed = Vec::new();
            for host in chunk {
                if check(host.clone()).await {
                    passed.push(host);
                }
            }
            passed
        });
    }

    let mut passed = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(hosts) => passed.extend(hosts),
            Err(e) => warn!(error = %e, "sweep task failed"),
        }
    }
    debug!(count = passed.len(), "sweep finished");
    passed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn range_skips_local_address() {
        let range = ip_range(Ipv4Addr::new(192, 168, 1, 42));
        assert_eq!(range.len(), 254);
        assert_eq!(range[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(range[253], Ipv4Addr::new(192, 168, 1, 255));
        assert!(!range.contains(&Ipv4Addr::new(192, 168, 1, 42)));
    }

    #[test]
    fn local_ip_reads_first_line_of_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, " 10.0.0.7 \nignored").unwrap();
        assert_eq!(local_ip(Some(file.path())).unwrap(), Ipv4Addr::new(10, 0, 0, 7));
    }

    #[test]
    fn local_ip_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            local_ip(Some(file.path())),
            Err(CoreError::LocalAddress { .. })
        ));
    }

    #[tokio::test]
    async fn fan_out_collects_passing_hosts_from_all_batches() {
        let hosts: Vec<u32> = (1..=10).collect();
        let mut passed = fan_out(hosts, 3, |n| async move { n % 2 == 0 }).await;
        passed.sort_unstable();
        assert_eq!(passed, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn fan_out_of_nothing_is_empty() {
        let passed = fan_out(Vec::<u32>::new(), 2, |_| async { true }).await;
        assert!(passed.is_empty());
    }
}
