use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::AppError;
use crate::model::{RunnerLog, Terraform};

const RUNNER_LOG_TAIL_LINES: i64 = 200;
const RUNNER_RESOURCE_LABEL: &str = "terraforms.tf.isaaguilar.com/resourceName";

/// Typed access to `Terraform` resources in one namespace.
#[async_trait]
pub trait TerraformStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Terraform, AppError>;
    async fn list(&self) -> Result<Vec<Terraform>, AppError>;
    async fn create(&self, resource: &Terraform) -> Result<Terraform, AppError>;
    /// Full-object replace. The resource must carry the `resourceVersion` it was read at.
    async fn update(&self, resource: &Terraform) -> Result<Terraform, AppError>;
    async fn delete(&self, name: &str) -> Result<(), AppError>;
    async fn runner_logs(&self, name: &str) -> Result<Vec<RunnerLog>, AppError>;
}

/// Opens a store for the duration of one request.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TerraformStore>, AppError>;
}

#[derive(Debug, Clone)]
pub struct KubeConnector {
    kubeconfig: PathBuf,
    context: Option<String>,
    namespace: String,
    timeout: Option<Duration>,
}

impl KubeConnector {
    pub fn new(
        kubeconfig: PathBuf,
        context: Option<String>,
        namespace: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            kubeconfig,
            context,
            namespace: namespace.into(),
            timeout,
        }
    }

    async fn client(&self) -> Result<Client, AppError> {
        let kubeconfig = Kubeconfig::read_from(&self.kubeconfig).map_err(|error| {
            AppError::Config(format!(
                "failed to read kubeconfig {}: {error}",
                self.kubeconfig.display()
            ))
        })?;
        let options = KubeConfigOptions {
            context: self.context.clone(),
            cluster: None,
            user: None,
        };
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|error| {
                AppError::Config(format!(
                    "failed to build Kubernetes configuration from {}: {error}",
                    self.kubeconfig.display()
                ))
            })?;
        if let Some(timeout) = self.timeout {
            config.connect_timeout = Some(timeout);
            config.read_timeout = Some(timeout);
        }

        Client::try_from(config).map_err(|error| {
            AppError::Config(format!("failed to initialize Kubernetes client: {error}"))
        })
    }
}

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self) -> Result<Box<dyn TerraformStore>, AppError> {
        let client = self.client().await?;
        debug!(namespace = %self.namespace, "opened Kubernetes client");
        Ok(Box::new(KubeTerraformStore::new(client, &self.namespace)))
    }
}

#[derive(Clone)]
pub struct KubeTerraformStore {
    terraforms: Api<Terraform>,
    pods: Api<Pod>,
}

impl KubeTerraformStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            terraforms: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
        }
    }

    async fn pod_log(&self, pod: Pod) -> RunnerLog {
        let name = pod.name_any();
        let phase = pod
            .status
            .as_ref()
            .and_then(|status| status.phase.clone())
            .unwrap_or_else(|| "-".to_string());
        let params = LogParams {
            tail_lines: Some(RUNNER_LOG_TAIL_LINES),
            timestamps: true,
            ..LogParams::default()
        };

        match self.pods.logs(&name, &params).await {
            Ok(content) => RunnerLog {
                pod: name,
                phase,
                content,
                error: None,
            },
            Err(error) => RunnerLog {
                pod: name,
                phase,
                content: String::new(),
                error: Some(error.to_string()),
            },
        }
    }
}

#[async_trait]
impl TerraformStore for KubeTerraformStore {
    async fn get(&self, name: &str) -> Result<Terraform, AppError> {
        self.terraforms
            .get(name)
            .await
            .map_err(|error| classify(error, StoreAction::Get, name))
    }

    async fn list(&self) -> Result<Vec<Terraform>, AppError> {
        let list = self
            .terraforms
            .list(&ListParams::default())
            .await
            .map_err(|error| classify(error, StoreAction::List, "terraforms"))?;
        Ok(list.items)
    }

    async fn create(&self, resource: &Terraform) -> Result<Terraform, AppError> {
        let name = resource.name_any();
        self.terraforms
            .create(&PostParams::default(), resource)
            .await
            .map_err(|error| classify(error, StoreAction::Create, &name))
    }

    async fn update(&self, resource: &Terraform) -> Result<Terraform, AppError> {
        let name = resource.name_any();
        self.terraforms
            .replace(&name, &PostParams::default(), resource)
            .await
            .map_err(|error| classify(error, StoreAction::Update, &name))
    }

    async fn delete(&self, name: &str) -> Result<(), AppError> {
        self.terraforms
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|error| classify(error, StoreAction::Delete, name))
    }

    async fn runner_logs(&self, name: &str) -> Result<Vec<RunnerLog>, AppError> {
        let params = ListParams::default().labels(&runner_selector(name));
        let pods = self
            .pods
            .list(&params)
            .await
            .map_err(|error| classify(error, StoreAction::List, "runner pods"))?;

        Ok(join_all(pods.items.into_iter().map(|pod| self.pod_log(pod))).await)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StoreAction {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl Display for StoreAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{verb}")
    }
}

/// Maps an API status code to the error taxonomy. 409 means a duplicate name on
/// create and a stale `resourceVersion` everywhere else.
pub fn classify_status(code: u16, message: &str, action: StoreAction, name: &str) -> AppError {
    match (code, action) {
        (404, _) => AppError::NotFound(name.to_string()),
        (409, StoreAction::Create) => AppError::AlreadyExists(name.to_string()),
        (409, _) => AppError::Conflict(format!("{action} {name}: {message}")),
        (400 | 422, _) => AppError::Validation(format!("{action} {name}: {message}")),
        _ => AppError::Remote(format!("{action} {name} failed with {code}: {message}")),
    }
}

/// Requests the client refuses to build (an empty name, for one) are validation
/// failures, the same as a 422 from the API server.
fn classify(error: kube::Error, action: StoreAction, name: &str) -> AppError {
    match error {
        kube::Error::Api(response) => classify_status(response.code, &response.message, action, name),
        kube::Error::BuildRequest(reason) => {
            AppError::Validation(format!("{action} {name}: {reason}"))
        }
        other => AppError::Remote(format!("{action} {name}: {other}")),
    }
}

fn runner_selector(name: &str) -> String {
    format!("{RUNNER_RESOURCE_LABEL}={name}")
}

#[cfg(test)]
mod tests {
    use super::{StoreAction, classify, classify_status, runner_selector};
    use crate::error::AppError;
    use kube::core::request::Error as RequestError;

    #[test]
    fn unbuildable_requests_are_validation_errors() {
        let error = kube::Error::BuildRequest(RequestError::Validation(
            "A non-empty name is required".to_string(),
        ));
        let error = classify(error, StoreAction::Get, "");
        assert!(matches!(error, AppError::Validation(message) if message.contains("non-empty name")));
    }

    #[test]
    fn conflict_on_create_means_duplicate_name() {
        let error = classify_status(409, "already exists", StoreAction::Create, "demo");
        assert!(matches!(error, AppError::AlreadyExists(name) if name == "demo"));
    }

    #[test]
    fn conflict_on_update_is_a_stale_version() {
        let error = classify_status(
            409,
            "the object has been modified",
            StoreAction::Update,
            "demo",
        );
        assert!(matches!(error, AppError::Conflict(message) if message.contains("modified")));
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert!(matches!(
            classify_status(404, "not found", StoreAction::Delete, "gone"),
            AppError::NotFound(name) if name == "gone"
        ));
        assert!(matches!(
            classify_status(422, "spec.terraformModule: Required", StoreAction::Create, "x"),
            AppError::Validation(_)
        ));
        assert!(matches!(
            classify_status(503, "unavailable", StoreAction::List, "terraforms"),
            AppError::Remote(_)
        ));
    }

    #[test]
    fn runner_pods_are_selected_by_resource_label() {
        assert_eq!(
            runner_selector("demo"),
            "terraforms.tf.isaaguilar.com/resourceName=demo"
        );
    }
}
