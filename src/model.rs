use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "tf.isaaguilar.com",
    version = "v1alpha1",
    kind = "Terraform",
    plural = "terraforms",
    namespaced,
    status = "TerraformStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct TerraformSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub terraform_module: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub terraform_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_runner_pull_policy: Option<PullPolicy>,
    #[serde(default)]
    pub keep_completed_pods: bool,
    #[serde(default)]
    pub write_outputs_to_status: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Operator fields this console does not model; kept so a replace does not drop them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TerraformStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl PullPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TerraformPhase {
    Pending,
    Running,
    Completed,
    Deleting,
    Failed,
    Unknown,
}

impl TerraformPhase {
    pub fn from_status(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "pending" | "initializing" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "deleting" => Self::Deleting,
            "failed" | "fail" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Deleting => "deleting",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Pending => "/img/pending.png",
            Self::Running => "/img/running.png",
            Self::Completed => "/img/completed.png",
            Self::Deleting => "/img/deleting.png",
            Self::Failed => "/img/fail.png",
            Self::Unknown => "/img/tf.png",
        }
    }
}

impl Display for TerraformPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Terraform {
    pub fn phase(&self) -> TerraformPhase {
        TerraformPhase::from_status(
            self.status
                .as_ref()
                .map(|status| status.phase.as_str())
                .unwrap_or_default(),
        )
    }
}

/// Terraform backend block that stores state in a cluster secret suffixed with the resource name.
pub fn kubernetes_backend(name: &str) -> String {
    format!(
        r#"terraform {{
  backend "kubernetes" {{
    secret_suffix = "{name}"
    in_cluster_config = true
  }}
}}
"#
    )
}

/// Form submitted to `/createnew`.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CreateRequest {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub module: String,
    pub env: Vec<(String, String)>,
}

impl CreateRequest {
    /// Reads `env1Name`/`env1Value` up to `env_slots`, then the single-pair `envName`/`envValue`
    /// form. Pairs without a name are empty form rows and are skipped.
    pub fn from_params(params: &HashMap<String, String>, env_slots: usize) -> Self {
        let field = |key: &str| params.get(key).cloned().unwrap_or_default();

        let mut env = (1..=env_slots)
            .map(|slot| {
                (
                    field(&format!("env{slot}Name")),
                    field(&format!("env{slot}Value")),
                )
            })
            .collect::<Vec<_>>();
        env.push((field("envName"), field("envValue")));
        env.retain(|(name, _)| !name.trim().is_empty());

        Self {
            name: field("tfName"),
            namespace: field("namespace"),
            version: field("tfVersion"),
            module: field("gitRepo"),
            env,
        }
    }

    pub fn into_resource(self, default_namespace: &str) -> Terraform {
        let namespace = if self.namespace.trim().is_empty() {
            default_namespace.to_string()
        } else {
            self.namespace
        };

        let mut resource = Terraform::new(
            &self.name,
            TerraformSpec {
                terraform_module: self.module,
                terraform_version: self.version,
                custom_backend: kubernetes_backend(&self.name),
                terraform_runner_pull_policy: Some(PullPolicy::IfNotPresent),
                keep_completed_pods: true,
                write_outputs_to_status: true,
                env: self
                    .env
                    .into_iter()
                    .map(|(name, value)| EnvVar {
                        name,
                        value: Some(value),
                        ..EnvVar::default()
                    })
                    .collect(),
                extra: BTreeMap::new(),
            },
        );
        resource.metadata.namespace = Some(namespace);
        resource
    }
}

/// Form submitted to `/getedit`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct EditRequest {
    #[serde(default, rename = "appName")]
    pub app_name: String,
    #[serde(default, rename = "gitRepo")]
    pub module: String,
    #[serde(default, rename = "envName")]
    pub env_name: Option<String>,
    #[serde(default, rename = "envValue")]
    pub env_value: Option<String>,
}

impl EditRequest {
    pub fn target_name(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.app_name)
    }

    /// Sets the module and, when an env name was submitted, the first env pair.
    /// The backend block is left as created.
    pub fn apply(&self, resource: &mut Terraform) {
        resource.spec.terraform_module = self.module.clone();

        let Some(name) = self
            .env_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
        else {
            return;
        };
        let value = self.env_value.clone().unwrap_or_default();
        match resource.spec.env.first_mut() {
            Some(first) => {
                first.name = name.to_string();
                first.value = Some(value);
                first.value_from = None;
            }
            None => resource.spec.env.push(EnvVar {
                name: name.to_string(),
                value: Some(value),
                ..EnvVar::default()
            }),
        }
    }
}

/// Resource name with the edit suffix removed, as expected by the `appName` field.
pub fn app_name_for(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return name.to_string();
    }
    name.strip_suffix(suffix).unwrap_or(name).to_string()
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct EnvPair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerraformSummary {
    pub name: String,
    pub namespace: String,
    pub generation: String,
    pub created: String,
    pub age: String,
    pub phase: String,
    pub phase_icon: String,
}

impl TerraformSummary {
    pub fn from_resource(resource: &Terraform) -> Self {
        let phase = resource.phase();
        Self {
            name: resource.name_any(),
            namespace: resource.namespace().unwrap_or_else(|| "-".to_string()),
            generation: resource
                .metadata
                .generation
                .map(|generation| generation.to_string())
                .unwrap_or_else(|| "-".to_string()),
            created: created_at(resource.metadata.creation_timestamp.as_ref()),
            age: human_age(resource.metadata.creation_timestamp.as_ref()),
            phase: phase.label().to_string(),
            phase_icon: phase.icon().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TerraformDetail {
    #[serde(flatten)]
    pub summary: TerraformSummary,
    pub app_name: String,
    pub module: String,
    pub version: String,
    pub backend: String,
    pub pull_policy: String,
    pub keep_completed_pods: bool,
    pub write_outputs_to_status: bool,
    pub env: Vec<EnvPair>,
    pub first_env: Option<EnvPair>,
}

impl TerraformDetail {
    pub fn from_resource(resource: &Terraform, edit_suffix: &str) -> Self {
        let summary = TerraformSummary::from_resource(resource);
        let env = resource
            .spec
            .env
            .iter()
            .map(|var| EnvPair {
                name: var.name.clone(),
                value: var.value.clone().unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        Self {
            app_name: app_name_for(&summary.name, edit_suffix),
            summary,
            module: resource.spec.terraform_module.clone(),
            version: resource.spec.terraform_version.clone(),
            backend: resource.spec.custom_backend.clone(),
            pull_policy: resource
                .spec
                .terraform_runner_pull_policy
                .map(PullPolicy::as_str)
                .unwrap_or("-")
                .to_string(),
            keep_completed_pods: resource.spec.keep_completed_pods,
            write_outputs_to_status: resource.spec.write_outputs_to_status,
            first_env: env.first().cloned(),
            env,
        }
    }
}

/// Tail of one runner pod's output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerLog {
    pub pod: String,
    pub phase: String,
    pub content: String,
    pub error: Option<String>,
}

pub fn yaml_detail<T>(value: &T) -> String
where
    T: Serialize,
{
    serde_yaml::to_string(value).unwrap_or_else(|error| format!("failed to format detail: {error}"))
}

fn created_at(timestamp: Option<&Time>) -> String {
    timestamp
        .map(|time| time.0.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };

    let elapsed_seconds =
        (k8s_openapi::jiff::Timestamp::now().as_second() - timestamp.0.as_second()).max(0);
    format_elapsed_seconds(elapsed_seconds)
}

fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}
