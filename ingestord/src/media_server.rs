//! Finalize-phase side effects: fixing up library permissions and poking
//! downstream media servers so newly cataloged material shows up without
//! waiting for their own periodic rescans.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use submarine::auth::AuthBuilder;
use tokio::process::Command;

/// Configuration for the finalize-phase media server pokes. Any field left
/// `None` skips that poke entirely rather than erroring.
#[derive(Debug, Clone, Default)]
pub struct MediaServerConfig {
    pub navidrome: Option<NavidromeConfig>,
    pub volumio_ssh_target: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NavidromeConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub client_name: String,
}

/// `chmod -R` the library tree so every downstream reader (media server,
/// other users on the box) can read it. Ownership is left alone — this
/// daemon does not run as root and must not attempt to `chown`.
pub fn fix_library_permissions(library_root: &Path) {
    tracing::info!(path = %library_root.display(), "fixing library permissions");
    for entry in walkdir::WalkDir::new(library_root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let mode = if entry.file_type().is_dir() { 0o2777 } else { 0o666 };
        if let Err(e) = set_unix_mode(entry.path(), mode) {
            tracing::debug!(path = %entry.path().display(), error = %e, "failed to chmod entry");
        }
    }
}

#[cfg(unix)]
fn set_unix_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_unix_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Trigger a Navidrome/Subsonic library scan. A no-op if Navidrome isn't
/// configured; failures are logged, not propagated, since a missed rescan
/// trigger is recovered by the server's own periodic scan.
pub async fn trigger_subsonic_scan(config: &Option<NavidromeConfig>) {
    let Some(nav) = config else {
        return;
    };

    let client = submarine::Client::new(
        &nav.url,
        AuthBuilder::new(&nav.username, "1.16.1")
            .client_name(&nav.client_name)
            .hashed(&nav.password),
    );

    tracing::info!(url = %nav.url, "triggering subsonic scan");
    match tokio::time::timeout(Duration::from_secs(10), client.start_scan()).await {
        Ok(Ok(_)) => tracing::info!("subsonic scan triggered"),
        Ok(Err(e)) => tracing::warn!(error = %e, "subsonic scan trigger failed"),
        Err(_) => tracing::warn!("subsonic scan trigger timed out"),
    }
}

/// Trigger a Volumio library rescan over SSH. A no-op if no target is
/// configured.
pub async fn trigger_volumio_rescan(ssh_target: &Option<String>) {
    let Some(target) = ssh_target else {
        return;
    };

    tracing::info!(target = %target, "triggering volumio rescan");
    match Command::new("ssh")
        .arg(target)
        .arg("volumio")
        .arg("rescan")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
    {
        Ok(output) if !output.status.success() => {
            tracing::warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "volumio rescan command failed"
            );
        }
        Ok(_) => tracing::info!("volumio rescan triggered"),
        Err(e) => tracing::warn!(error = %e, "failed to launch ssh for volumio rescan"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn fix_library_permissions_walks_without_panicking_on_empty_tree() {
        let dir = TempDir::new().unwrap();
        fix_library_permissions(dir.path());
    }

    #[cfg(unix)]
    #[test]
    fn fix_library_permissions_sets_world_writable_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.flac");
        fs::write(&file, b"x").unwrap();

        fix_library_permissions(dir.path());

        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o666);
    }

    #[tokio::test]
    async fn trigger_subsonic_scan_is_noop_without_config() {
        trigger_subsonic_scan(&None).await;
    }

    #[tokio::test]
    async fn trigger_volumio_rescan_is_noop_without_target() {
        trigger_volumio_rescan(&None).await;
    }
}
