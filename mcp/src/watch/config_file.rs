//! Configuration file watcher.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Weak},
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{debouncer, Reloadable};
use crate::{
    core::config::ServerConfig,
    error::{McpError, McpResult},
};

/// Re-reads the configuration when the file changes.
pub type ConfigLoader = Arc<dyn Fn() -> BoxFuture<'static, McpResult<ServerConfig>> + Send + Sync>;

pub struct ConfigWatcher {
    path: PathBuf,
    window: Duration,
    loader: ConfigLoader,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, window: Duration, loader: ConfigLoader) -> Self {
        Self {
            path: path.into(),
            window,
            loader,
        }
    }

    /// Start watching. Watcher setup errors are returned; later failures are logged.
    ///
    /// The task ends when `target` is dropped.
    pub fn spawn(self, target: Weak<dyn Reloadable>) -> McpResult<JoinHandle<()>> {
        let path = std::path::absolute(&self.path)?;
        let parent = path
            .parent()
            .ok_or_else(|| {
                McpError::Watch(format!("{} has no parent directory", path.display()))
            })?
            .to_path_buf();
        let file_name = path.file_name().map(|name| name.to_os_string());

        let (handle, mut debouncer) = debouncer(self.window);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_change_to(&event, file_name.as_deref()) => handle.signal(),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Configuration watch error"),
            }
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "Watching configuration file");

        let loader = self.loader;
        Ok(tokio::spawn(async move {
            // Keep the watcher alive for the lifetime of the task.
            let _watcher = watcher;
            while let Some(events) = debouncer.next().await {
                let Some(target) = target.upgrade() else {
                    break;
                };
                info!(path = %path.display(), events, "Configuration file changed, reloading");
                match loader().await {
                    Ok(config) => {
                        if let Err(e) = target.reload_configuration(config).await {
                            error!(error = %e, "Configuration reload failed, keeping previous configuration");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read configuration, keeping previous configuration");
                    }
                }
            }
        }))
    }
}

fn is_change_to(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == file_name)
}

/// Loader reading a YAML [`ServerConfig`] from `path` with environment overrides applied.
pub fn yaml_loader(path: impl AsRef<Path>) -> ConfigLoader {
    let path = path.as_ref().to_path_buf();
    Arc::new(move || {
        let path = path.clone();
        async move {
            let config = ServerConfig::from_file(&path).await?;
            Ok::<_, McpError>(config.with_env_overrides())
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use notify::event::{CreateKind, ModifyKind};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording {
        configs: Mutex<Vec<ServerConfig>>,
        reloads: AtomicUsize,
    }

    #[async_trait]
    impl Reloadable for Recording {
        async fn reload(&self) -> McpResult<()> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reload_configuration(&self, config: ServerConfig) -> McpResult<()> {
            self.configs.lock().push(config);
            Ok(())
        }
    }

    #[test]
    fn test_event_filter() {
        let name = std::ffi::OsStr::new("config.yaml");
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/kms/config.yaml"));
        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/kms/config.yaml"));
        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/kms/other.yaml"));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/etc/kms/config.yaml"));

        assert!(is_change_to(&modify, Some(name)));
        assert!(is_change_to(&create, Some(name)));
        assert!(!is_change_to(&other, Some(name)));
        assert!(!is_change_to(&access, Some(name)));
    }

    #[tokio::test]
    async fn test_yaml_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "read_only: true\n").unwrap();

        let config = yaml_loader(&path)().await.unwrap();
        assert!(config.read_only);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_file_change_triggers_configuration_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "read_only: false\n").unwrap();

        let target = Arc::new(Recording::default());
        let weak: Weak<dyn Reloadable> = Arc::downgrade(&(target.clone() as Arc<dyn Reloadable>));
        let task = ConfigWatcher::new(&path, Duration::from_millis(50), yaml_loader(&path))
            .spawn(weak)
            .unwrap();

        std::fs::write(&path, "read_only: true\n").unwrap();

        for _ in 0..100 {
            if !target.configs.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        task.abort();

        let configs = target.configs.lock();
        assert!(!configs.is_empty(), "file change was not observed");
        assert!(configs.last().unwrap().read_only);
        assert_eq!(target.reloads.load(Ordering::SeqCst), 0);
    }
}
