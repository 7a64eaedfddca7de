//! Browser manager: Chrome lifecycle and identity extraction.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use whipper_core::{Error, Result};

use crate::cdp;
use crate::config::BrowserConfig;
use crate::driver::DrivenBrowser;
use crate::types::*;

/// A launched browser process owned by the manager.
struct BrowserProcess {
    child: Child,
    headless: bool,
    version: CdpVersionInfo,
    launched_at: String,
    /// Copy of a locked profile; removed when the process closes.
    temp_profile: Option<PathBuf>,
}

/// Owns the single driven browser of this process.
pub struct BrowserManager {
    pub config: RwLock<BrowserConfig>,
    data_dir: PathBuf,
    process: Mutex<Option<BrowserProcess>>,
}

impl BrowserManager {
    /// Create a manager with config loaded from `data_dir`. Nothing is launched yet.
    pub fn new(data_dir: &Path) -> Self {
        let config = BrowserConfig::load(data_dir);
        info!(
            "BrowserManager initialized: headless={}, port={}",
            config.headless, config.debugging_port
        );

        Self {
            config: RwLock::new(config),
            data_dir: data_dir.to_path_buf(),
            process: Mutex::new(None),
        }
    }

    /// Current browser status.
    pub async fn status(&self) -> BrowserStatus {
        let process = self.process.lock().await;
        match process.as_ref() {
            Some(p) => BrowserStatus {
                running: true,
                pid: p.child.id(),
                headless: p.headless,
                launched_at: Some(p.launched_at.clone()),
                browser_version: p.version.browser.clone(),
                temporary_profile: p.temp_profile.is_some(),
            },
            None => BrowserStatus {
                running: false,
                pid: None,
                headless: self.config.read().headless,
                launched_at: None,
                browser_version: None,
                temporary_profile: false,
            },
        }
    }

    pub async fn is_running(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// Launch the browser unless it is already running.
    pub async fn launch(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if process.is_none() {
            let headless = self.config.read().headless;
            *process = Some(self.spawn(headless).await?);
        }
        Ok(())
    }

    /// Restart the browser with a visible window for interactive login.
    /// The configured headless mode is left untouched.
    pub async fn launch_visible(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        Self::shutdown(&mut process).await;
        *process = Some(self.spawn(false).await?);
        Ok(())
    }

    /// Switch between headless and visible mode for subsequent launches.
    pub fn set_headless(&self, headless: bool) {
        let mut config = self.config.write();
        config.headless = headless;
        if let Err(e) = config.save() {
            warn!("Failed to save browser config: {}", e);
        }
    }

    async fn spawn(&self, headless: bool) -> Result<BrowserProcess> {
        let config = self.config.read().clone();
        let executable = match &config.executable {
            Some(path) => path.clone(),
            None => find_browser_executable().ok_or_else(|| {
                Error::Browser(
                    "Could not find a Chrome/Chromium executable. \
                     Install one or set `executable` in browser/config.json."
                        .into(),
                )
            })?,
        };

        let port = config.debugging_port;
        if cdp::fetch_version(port).await.is_ok() {
            return Err(Error::Browser(format!(
                "Debugging port {} is already served by another browser; close it first",
                port
            )));
        }

        let profile = config.profile_dir(&self.data_dir);
        std::fs::create_dir_all(&profile)?;
        let temp_profile = if is_profile_locked(&profile) {
            let copy = std::env::temp_dir().join(format!("whipper-profile-{}", uuid::Uuid::new_v4()));
            warn!(
                "Profile {} is locked, launching from copy {}",
                profile.display(),
                copy.display()
            );
            copy_profile(&profile, &copy)?;
            Some(copy)
        } else {
            None
        };
        let user_data_dir = temp_profile.as_deref().unwrap_or(&profile);

        let mut args = vec![
            format!("--remote-debugging-port={}", port),
            format!("--user-data-dir={}", user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }
        args.push(config.start_url.clone());

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", executable, e)))?;

        let deadline = Instant::now() + Duration::from_secs(config.launch_timeout_secs);
        let mut last_error = "endpoint not reachable".to_string();
        while Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(200)).await;

            if let Ok(Some(status)) = child.try_wait() {
                remove_temp_profile(temp_profile.as_deref());
                return Err(Error::Browser(format!(
                    "Browser exited before its debugging endpoint came up (status: {})",
                    status
                )));
            }

            match cdp::fetch_version(port).await {
                Ok(version) => {
                    info!(
                        "Browser launched: pid={:?}, {}",
                        child.id(),
                        version.browser.as_deref().unwrap_or("unknown version")
                    );
                    return Ok(BrowserProcess {
                        child,
                        headless,
                        version,
                        launched_at: chrono::Utc::now().to_rfc3339(),
                        temp_profile,
                    });
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        let _ = child.kill().await;
        remove_temp_profile(temp_profile.as_deref());
        Err(Error::Timeout(format!(
            "browser debugging endpoint on port {}: {}",
            port, last_error
        )))
    }

    async fn shutdown(process: &mut Option<BrowserProcess>) {
        if let Some(mut p) = process.take() {
            if let Err(e) = p.child.kill().await {
                warn!("Failed to kill browser process: {}", e);
            }
            remove_temp_profile(p.temp_profile.as_deref());
            info!("Browser closed");
        }
    }
}

#[async_trait]
impl DrivenBrowser for BrowserManager {
    async fn identity(&self) -> Result<BrowserIdentity> {
        let mut process = self.process.lock().await;
        if process.is_none() {
            let headless = self.config.read().headless;
            *process = Some(self.spawn(headless).await?);
        }
        let Some(p) = process.as_ref() else {
            return Err(Error::Internal("browser process vanished".into()));
        };

        let cookies = cdp::get_cookies(&p.version.web_socket_debugger_url).await?;
        let domains = self.config.read().cookie_domains.clone();
        let cookie_header = cookie_header(&cookies, &domains);
        debug!("Collected {} browser cookies", cookies.len());

        Ok(BrowserIdentity {
            cookie_header,
            user_agent: p
                .version
                .user_agent
                .as_ref()
                .map(|ua| ua.replace("HeadlessChrome", "Chrome")),
        })
    }

    async fn relaunch(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        Self::shutdown(&mut process).await;
        let headless = self.config.read().headless;
        *process = Some(self.spawn(headless).await?);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        Self::shutdown(&mut process).await;
        Ok(())
    }
}

/// Locate a Chromium-family executable on this machine.
pub fn find_browser_executable() -> Option<String> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &["chrome.exe", "msedge.exe"]
    } else {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium-browser",
            "chromium",
            "/snap/bin/chromium",
        ]
    };

    candidates.iter().find_map(|candidate| {
        if candidate.starts_with('/') {
            Path::new(candidate).exists().then(|| candidate.to_string())
        } else {
            which::which(candidate)
                .ok()
                .map(|p| p.to_string_lossy().to_string())
        }
    })
}

/// Chrome leaves a `SingletonLock` symlink in a profile that is in use.
fn is_profile_locked(profile: &Path) -> bool {
    std::fs::symlink_metadata(profile.join("SingletonLock")).is_ok()
}

/// Copy a profile directory, leaving out the singleton lock files.
fn copy_profile(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("Singleton") {
            continue;
        }
        let file_type = entry.file_type()?;
        let target = to.join(&name);
        if file_type.is_dir() {
            copy_profile(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

fn remove_temp_profile(dir: Option<&Path>) {
    if let Some(dir) = dir {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!("Failed to remove temporary profile {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_profile_skips_locks() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("profile");
        std::fs::create_dir_all(from.join("Default")).unwrap();
        std::fs::write(from.join("Default").join("Cookies"), b"cookie-db").unwrap();
        std::fs::write(from.join("SingletonLock"), b"host-123").unwrap();
        std::fs::write(from.join("Local State"), b"{}").unwrap();

        assert!(is_profile_locked(&from));

        let to = dir.path().join("copy");
        copy_profile(&from, &to).unwrap();
        assert_eq!(
            std::fs::read(to.join("Default").join("Cookies")).unwrap(),
            b"cookie-db"
        );
        assert!(to.join("Local State").exists());
        assert!(!is_profile_locked(&to));
    }

    #[tokio::test]
    async fn test_new_manager_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BrowserManager::new(dir.path());
        assert!(!manager.is_running().await);

        let status = manager.status().await;
        assert!(!status.running);
        assert!(status.headless);

        // Closing an idle manager is a no-op.
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_with_missing_executable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BrowserManager::new(dir.path());
        {
            let mut config = manager.config.write();
            config.executable = Some(dir.path().join("no-such-browser").display().to_string());
            config.debugging_port = {
                let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
                l.local_addr().unwrap().port()
            };
        }

        let err = manager.launch().await.unwrap_err();
        assert!(matches!(err, Error::Browser(_)));
        assert!(!manager.is_running().await);
    }

    #[test]
    fn test_set_headless_persists() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BrowserManager::new(dir.path());
        manager.set_headless(false);

        let reloaded = BrowserConfig::load(dir.path());
        assert!(!reloaded.headless);
    }
}
