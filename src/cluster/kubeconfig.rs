//! Kubeconfig file access shared by the file-backed providers.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use kube::config::Kubeconfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Fields of a kubeconfig user entry that carry credentials.
const SECRET_USER_FIELDS: &[&str] = &[
    "client-certificate-data",
    "client-key-data",
    "token",
    "password",
];

const REDACTED: &str = "REDACTED";

/// Resolve the kubeconfig path: explicit, then the first `KUBECONFIG` entry,
/// then `~/.kube/config`.
pub fn resolve_path(explicit: Option<&Path>) -> AppResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(first) = std::env::var_os("KUBECONFIG")
        .as_deref()
        .and_then(|value| std::env::split_paths(value).next())
        .filter(|path| !path.as_os_str().is_empty())
    {
        return Ok(first);
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
        .ok_or_else(|| AppError::Config("cannot locate kubeconfig: HOME is not set".to_string()))
}

/// The parsed kubeconfig plus the file it came from.
#[derive(Clone)]
pub struct KubeconfigSource {
    path: PathBuf,
    current: Arc<RwLock<Kubeconfig>>,
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
}

impl KubeconfigSource {
    pub fn load(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let kubeconfig = Kubeconfig::read_from(&path)?;
        debug!(path = %path.display(), contexts = kubeconfig.contexts.len(), "Loaded kubeconfig");
        Ok(Self {
            path,
            current: Arc::new(RwLock::new(kubeconfig)),
            watcher: Arc::new(Mutex::new(None)),
        })
    }

    pub fn from_kubeconfig(path: impl Into<PathBuf>, kubeconfig: Kubeconfig) -> Self {
        Self {
            path: path.into(),
            current: Arc::new(RwLock::new(kubeconfig)),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kubeconfig(&self) -> Kubeconfig {
        self.current.read().clone()
    }

    /// Re-read the file. On failure the previously loaded kubeconfig stays.
    pub async fn refresh(&self) -> AppResult<Kubeconfig> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let kubeconfig = Kubeconfig::from_yaml(&content)?;
        *self.current.write() = kubeconfig.clone();
        Ok(kubeconfig)
    }

    pub fn context_names(&self) -> Vec<String> {
        context_names(&self.current.read())
    }

    /// `current-context`, or the first context when it is unset.
    pub fn current_context(&self) -> Option<String> {
        let kubeconfig = self.current.read();
        kubeconfig
            .current_context
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| kubeconfig.contexts.first().map(|c| c.name.clone()))
    }

    /// Call `on_change` after every write to the kubeconfig file.
    ///
    /// The parsed kubeconfig is refreshed before the callback runs; unparsable
    /// writes are logged and skipped. Replaces any previous watcher.
    pub fn watch(&self, on_change: impl Fn() + Send + 'static) -> AppResult<()> {
        let path = std::path::absolute(&self.path)?;
        let parent = path
            .parent()
            .ok_or_else(|| AppError::Config(format!("{} has no parent directory", path.display())))?
            .to_path_buf();
        let file_name: Option<OsString> = path.file_name().map(|n| n.to_os_string());
        let current = self.current.clone();
        let watched = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Kubeconfig watch error");
                    return;
                }
            };
            let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                && event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == file_name.as_deref());
            if !relevant {
                return;
            }
            match Kubeconfig::read_from(&watched) {
                Ok(kubeconfig) => {
                    *current.write() = kubeconfig;
                    info!(path = %watched.display(), "Kubeconfig changed");
                    on_change();
                }
                Err(e) => warn!(error = %e, "Ignoring unreadable kubeconfig update"),
            }
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    pub fn stop_watching(&self) {
        self.watcher.lock().take();
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}

pub fn context_names(kubeconfig: &Kubeconfig) -> Vec<String> {
    kubeconfig.contexts.iter().map(|c| c.name.clone()).collect()
}

/// Serialize `kubeconfig` for display with credentials replaced.
///
/// When `minify` is set only the current context, its cluster and its user are kept.
pub fn redacted_view(kubeconfig: &Kubeconfig, minify: bool) -> AppResult<Value> {
    let mut view = serde_json::to_value(kubeconfig)?;
    let Some(root) = view.as_object_mut() else {
        return Ok(view);
    };

    if minify {
        let current = root
            .get("current-context")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(current) = current {
            minify_to(root, &current);
        }
    }

    if let Some(users) = root.get_mut("users").and_then(Value::as_array_mut) {
        for user in users {
            if let Some(auth) = user.get_mut("user").and_then(Value::as_object_mut) {
                redact(auth);
            }
        }
    }
    Ok(view)
}

fn minify_to(root: &mut Map<String, Value>, context: &str) {
    let mut cluster = None;
    let mut user = None;
    if let Some(contexts) = root.get_mut("contexts").and_then(Value::as_array_mut) {
        contexts.retain(|c| c.get("name").and_then(Value::as_str) == Some(context));
        if let Some(entry) = contexts.first().and_then(|c| c.get("context")) {
            cluster = entry.get("cluster").and_then(Value::as_str).map(str::to_string);
            user = entry.get("user").and_then(Value::as_str).map(str::to_string);
        }
    }
    retain_named(root, "clusters", cluster.as_deref());
    retain_named(root, "users", user.as_deref());
}

fn retain_named(root: &mut Map<String, Value>, key: &str, name: Option<&str>) {
    if let Some(entries) = root.get_mut(key).and_then(Value::as_array_mut) {
        entries.retain(|e| name.is_some() && e.get("name").and_then(Value::as_str) == name);
    }
}

fn redact(auth: &mut Map<String, Value>) {
    for field in SECRET_USER_FIELDS {
        if let Some(value) = auth.get_mut(*field) {
            if !value.is_null() {
                *value = Value::String(REDACTED.to_string());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://dev.example.com
- name: prod-cluster
  cluster:
    server: https://prod.example.com
contexts:
- name: dev
  context:
    cluster: dev-cluster
    user: dev-user
- name: prod
  context:
    cluster: prod-cluster
    user: prod-user
users:
- name: dev-user
  user:
    token: dev-secret
- name: prod-user
  user:
    token: prod-secret
"#;

    fn kubeconfig() -> Kubeconfig {
        Kubeconfig::from_yaml(KUBECONFIG).unwrap()
    }

    #[test]
    fn test_context_names_and_current() {
        let source = KubeconfigSource::from_kubeconfig("/tmp/config", kubeconfig());
        assert_eq!(source.context_names(), vec!["dev", "prod"]);
        assert_eq!(source.current_context().as_deref(), Some("dev"));
    }

    #[test]
    fn test_current_context_falls_back_to_first() {
        let mut config = kubeconfig();
        config.current_context = None;
        let source = KubeconfigSource::from_kubeconfig("/tmp/config", config);
        assert_eq!(source.current_context().as_deref(), Some("dev"));
    }

    #[test]
    fn test_redacted_view_minified() {
        let view = redacted_view(&kubeconfig(), true).unwrap();
        let text = serde_json::to_string(&view).unwrap();
        assert!(!text.contains("dev-secret"));
        assert!(!text.contains("prod"));
        assert!(text.contains(REDACTED));
        assert_eq!(view["contexts"].as_array().unwrap().len(), 1);
        assert_eq!(view["clusters"][0]["name"], "dev-cluster");
    }

    #[test]
    fn test_redacted_view_full() {
        let view = redacted_view(&kubeconfig(), false).unwrap();
        let text = serde_json::to_string(&view).unwrap();
        assert!(!text.contains("secret"));
        assert_eq!(view["contexts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, KUBECONFIG).unwrap();
        let source = KubeconfigSource::load(&path).unwrap();

        std::fs::write(&path, "contexts: {{ not yaml").unwrap();
        assert!(source.refresh().await.is_err());
        assert_eq!(source.context_names(), vec!["dev", "prod"]);
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_path() {
        let explicit = resolve_path(Some(Path::new("/etc/kube/config"))).unwrap();
        assert_eq!(explicit, PathBuf::from("/etc/kube/config"));

        std::env::set_var("KUBECONFIG", "/a/config:/b/config");
        assert_eq!(resolve_path(None).unwrap(), PathBuf::from("/a/config"));
        std::env::remove_var("KUBECONFIG");
    }
}
