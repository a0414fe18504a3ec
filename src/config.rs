use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::CliArgs;
use crate::handlers::HandlerSettings;

pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
pub const CONFIG_ENV: &str = "TFCONSOLE_CONFIG";

const DEFAULT_LISTEN: &str = "0.0.0.0:1323";
const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_ENV_SLOTS: usize = 3;
const DEFAULT_EDIT_NAME_SUFFIX: &str = "-appengine";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConsoleConfigFile {
    #[serde(default)]
    listen: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    views_dir: Option<PathBuf>,
    #[serde(default)]
    assets_dir: Option<PathBuf>,
    #[serde(default)]
    env_slots: Option<usize>,
    #[serde(default)]
    edit_name_suffix: Option<String>,
    #[serde(default, alias = "timeout", alias = "timeout_secs")]
    remote_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServerConfig {
    pub kubeconfig: PathBuf,
    pub context: Option<String>,
    pub listen: String,
    pub namespace: String,
    pub views_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub env_slots: usize,
    pub edit_name_suffix: String,
    pub remote_timeout: Option<Duration>,
    pub source: Option<String>,
}

impl ServerConfig {
    /// Resolves startup configuration. Fails when `KUBECONFIG` is missing or the
    /// settings file cannot be read.
    pub fn resolve(args: &CliArgs) -> Result<Self> {
        let kubeconfig = kubeconfig_path(std::env::var_os(KUBECONFIG_ENV))?;
        let path = args.config.clone().or_else(discover_config_path);
        let file = match &path {
            Some(path) => load_config_file(path)?,
            None => ConsoleConfigFile::default(),
        };

        let mut config = Self::merge(kubeconfig, args, file);
        config.source = path.map(|path| path.display().to_string());
        Ok(config)
    }

    fn merge(kubeconfig: PathBuf, args: &CliArgs, file: ConsoleConfigFile) -> Self {
        Self {
            kubeconfig,
            context: args.context.clone().or(file.context),
            listen: args
                .listen
                .clone()
                .or(file.listen)
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            namespace: args
                .namespace
                .clone()
                .or(file.namespace)
                .filter(|namespace| !namespace.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            views_dir: args
                .views_dir
                .clone()
                .or(file.views_dir)
                .unwrap_or_else(|| PathBuf::from("views")),
            assets_dir: args
                .assets_dir
                .clone()
                .or(file.assets_dir)
                .unwrap_or_else(|| PathBuf::from("assets")),
            env_slots: args
                .env_slots
                .or(file.env_slots)
                .unwrap_or(DEFAULT_ENV_SLOTS)
                .max(1),
            edit_name_suffix: args
                .edit_name_suffix
                .clone()
                .or(file.edit_name_suffix)
                .unwrap_or_else(|| DEFAULT_EDIT_NAME_SUFFIX.to_string()),
            remote_timeout: args
                .remote_timeout_secs
                .or(file.remote_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            source: None,
        }
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            namespace: self.namespace.clone(),
            env_slots: self.env_slots,
            edit_name_suffix: self.edit_name_suffix.clone(),
        }
    }
}

/// First entry of a `KUBECONFIG`-style path list.
fn kubeconfig_path(value: Option<std::ffi::OsString>) -> Result<PathBuf> {
    let value = value.with_context(|| format!("cannot get kubeconfig from {KUBECONFIG_ENV}"))?;
    std::env::split_paths(&value)
        .find(|path| !path.as_os_str().is_empty())
        .with_context(|| format!("{KUBECONFIG_ENV} is set but empty"))
}

fn load_config_file(path: &Path) -> Result<ConsoleConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(ConsoleConfigFile::default());
    }
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("tfconsole.yaml"),
        PathBuf::from("tfconsole.yml"),
        PathBuf::from(".tfconsole.yaml"),
    ];
    if let Some(candidate) = cwd_candidates.into_iter().find(|path| path.exists()) {
        return Some(candidate);
    }

    let home = std::env::var("HOME").ok()?;
    let candidate = PathBuf::from(home).join(".config/tfconsole/config.yaml");
    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::{ConsoleConfigFile, ServerConfig, kubeconfig_path, load_config_file};
    use crate::cli::CliArgs;
    use std::ffi::OsString;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn missing_kubeconfig_is_fatal() {
        let error = kubeconfig_path(None).expect_err("unset variable fails");
        assert!(error.to_string().contains("KUBECONFIG"));
        assert!(kubeconfig_path(Some(OsString::new())).is_err());
    }

    #[test]
    fn first_kubeconfig_entry_wins() {
        let value = std::env::join_paths(["/etc/kube/admin.conf", "/home/ops/.kube/config"])
            .expect("joinable paths");
        assert_eq!(
            kubeconfig_path(Some(value)).expect("path"),
            PathBuf::from("/etc/kube/admin.conf")
        );
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let config = ServerConfig::merge(
            PathBuf::from("/kube/config"),
            &CliArgs::default(),
            ConsoleConfigFile::default(),
        );
        assert_eq!(config.listen, "0.0.0.0:1323");
        assert_eq!(config.namespace, "default");
        assert_eq!(config.env_slots, 3);
        assert_eq!(config.edit_name_suffix, "-appengine");
        assert_eq!(config.views_dir, PathBuf::from("views"));
        assert_eq!(config.remote_timeout, None);
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tfconsole.yaml");
        std::fs::write(
            &path,
            "listen: 127.0.0.1:8080\nnamespace: terraform\nenv_slots: 5\nedit_name_suffix: \"\"\ntimeout: 15\n",
        )
        .expect("write settings");
        let file = load_config_file(&path).expect("settings parse");

        let args = CliArgs {
            namespace: Some("ops".to_string()),
            env_slots: Some(0),
            ..CliArgs::default()
        };
        let config = ServerConfig::merge(PathBuf::from("/kube/config"), &args, file);

        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.namespace, "ops");
        assert_eq!(config.env_slots, 1);
        assert_eq!(config.edit_name_suffix, "");
        assert_eq!(config.remote_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.handler_settings().namespace, "ops");
    }

    #[test]
    fn unknown_settings_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tfconsole.yaml");
        std::fs::write(&path, "namespce: typo\n").expect("write settings");
        assert!(load_config_file(&path).is_err());
    }
}
