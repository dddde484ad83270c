//! Hot reload of the backend list.
//!
//! The config file's directory is watched with `notify`, and SIGHUP forces a
//! reload. Each parsed file is handed to a callback; only backend additions
//! take effect at runtime.

use crate::config::{read_config, Config};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Editors write files in several steps; wait this long for them to settle.
const SETTLE: Duration = Duration::from_millis(200);

pub type ReloadCallback = Box<dyn Fn(Config) + Send + Sync>;

pub struct ConfigWatcher {
    config_path: PathBuf,
    reload_callback: ReloadCallback,
}

impl ConfigWatcher {
    pub fn new(config_path: PathBuf, reload_callback: ReloadCallback) -> Self {
        Self {
            config_path,
            reload_callback,
        }
    }

    /// Watch until shutdown. Failing to set up the file watch leaves SIGHUP
    /// as the only reload trigger.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let (tx, mut events) = mpsc::unbounded_channel();
        let _watcher = match self.watch(tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                error!(path = %self.config_path.display(), error = %e, "cannot watch config file");
                None
            }
        };

        #[cfg(unix)]
        let mut hangup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    warn!(error = %e, "SIGHUP reload unavailable");
                    None
                }
            };

        info!(path = %self.config_path.display(), "watching config for backend changes");

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    if !self.should_reload(&event) {
                        continue;
                    }
                    tokio::time::sleep(SETTLE).await;
                    while events.try_recv().is_ok() {}
                    debug!("config file changed");
                    self.try_reload();
                }

                _ = async {
                    #[cfg(unix)]
                    if let Some(signal) = hangup.as_mut() {
                        signal.recv().await;
                        return;
                    }
                    std::future::pending::<()>().await
                } => {
                    info!("SIGHUP received");
                    self.try_reload();
                }

                _ = shutdown.recv() => {
                    debug!("config watcher stopped");
                    break;
                }
            }
        }
    }

    /// Watch the parent directory, since editors often replace the file.
    fn watch(&self, tx: mpsc::UnboundedSender<Event>) -> notify::Result<RecommendedWatcher> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })?;

        let dir = self
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    /// Check if this event should trigger a reload.
    fn should_reload(&self, event: &Event) -> bool {
        let is_our_file = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.config_path.file_name());

        is_our_file && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
    }

    /// Try to reload the configuration.
    ///
    /// Returns true if the callback was invoked.
    fn try_reload(&self) -> bool {
        let new_config = match read_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "reload skipped, keeping current backends");
                return false;
            }
        };

        if let Some(bad) = new_config
            .backends
            .iter()
            .find(|b| b.host.is_empty() || b.port == 0)
        {
            error!(backend = %bad, "new config has an invalid backend, keeping current");
            return false;
        }

        info!(
            backends = new_config.backends.len(),
            "configuration reloaded; only backend additions apply at runtime"
        );
        (self.reload_callback)(new_config);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    fn noop_watcher(path: &str) -> ConfigWatcher {
        let callback: ReloadCallback = Box::new(|_| {});
        ConfigWatcher::new(PathBuf::from(path), callback)
    }

    #[test]
    fn test_should_reload_modify() {
        let watcher = noop_watcher("/test/config.yaml");

        let event = Event {
            kind: notify::EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from("/test/config.yaml")],
            attrs: Default::default(),
        };

        assert!(watcher.should_reload(&event));
    }

    #[test]
    fn test_should_reload_wrong_file() {
        let watcher = noop_watcher("/test/config.yaml");

        let event = Event {
            kind: notify::EventKind::Create(notify::event::CreateKind::File),
            paths: vec![PathBuf::from("/test/other.yaml")],
            attrs: Default::default(),
        };

        assert!(!watcher.should_reload(&event));
    }

    #[test]
    fn test_should_reload_delete_ignored() {
        let watcher = noop_watcher("/test/config.yaml");

        let event = Event {
            kind: notify::EventKind::Remove(notify::event::RemoveKind::File),
            paths: vec![PathBuf::from("/test/config.yaml")],
            attrs: Default::default(),
        };

        assert!(!watcher.should_reload(&event));
    }

    #[test]
    fn test_try_reload_hands_backends_to_callback() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"backends:\n  - port: 9081\n  - host: 10.0.0.5\n    port: 9100\n")
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let callback: ReloadCallback = Box::new(move |config| {
            seen_cb.store(config.backends.len(), Ordering::SeqCst);
        });

        let watcher = ConfigWatcher::new(file.path().to_path_buf(), callback);
        assert!(watcher.try_reload());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_try_reload_rejects_bad_backend() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"backends:\n  - port: 0\n").unwrap();

        let called = Arc::new(AtomicUsize::new(0));
        let called_cb = Arc::clone(&called);
        let callback: ReloadCallback = Box::new(move |_| {
            called_cb.fetch_add(1, Ordering::SeqCst);
        });

        let watcher = ConfigWatcher::new(file.path().to_path_buf(), callback);
        assert!(!watcher.try_reload());
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}
