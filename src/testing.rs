use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AppError;
use crate::k8s::{Connector, StoreAction, TerraformStore, classify_status};
use crate::model::{RunnerLog, Terraform};

/// In-memory stand-in for the API server, with the status semantics handlers rely on.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<ClusterState>>,
}

#[derive(Default)]
struct ClusterState {
    resources: BTreeMap<String, Terraform>,
    runner_logs: HashMap<String, Vec<RunnerLog>>,
    bump_on_get: HashSet<String>,
    vanish_on_get: HashSet<String>,
    connect_error: Option<String>,
    next_version: u64,
}

impl ClusterState {
    fn next_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

impl MemoryCluster {
    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn resource(&self, name: &str) -> Option<Terraform> {
        self.state().resources.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.state().resources.keys().cloned().collect()
    }

    pub fn fail_connections(&self, message: &str) {
        self.state().connect_error = Some(message.to_string());
    }

    /// Simulates a concurrent writer touching `name` right after the next read of it.
    pub fn bump_on_next_get(&self, name: &str) {
        self.state().bump_on_get.insert(name.to_string());
    }

    /// Simulates a concurrent delete of `name` right after the next read of it.
    pub fn vanish_on_next_get(&self, name: &str) {
        self.state().vanish_on_get.insert(name.to_string());
    }

    pub fn set_runner_log(&self, name: &str, pod: &str, content: &str) {
        self.state()
            .runner_logs
            .entry(name.to_string())
            .or_default()
            .push(RunnerLog {
                pod: pod.to_string(),
                phase: "Succeeded".to_string(),
                content: content.to_string(),
                error: None,
            });
    }
}

#[async_trait]
impl Connector for MemoryCluster {
    async fn connect(&self) -> Result<Box<dyn TerraformStore>, AppError> {
        if let Some(message) = self.state().connect_error.clone() {
            return Err(AppError::Config(message));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl TerraformStore for MemoryCluster {
    async fn get(&self, name: &str) -> Result<Terraform, AppError> {
        require_name(StoreAction::Get, name)?;
        let mut state = self.state();
        let resource = state
            .resources
            .get(name)
            .cloned()
            .ok_or_else(|| classify_status(404, "not found", StoreAction::Get, name))?;

        if state.bump_on_get.remove(name) {
            let version = state.next_version();
            if let Some(stored) = state.resources.get_mut(name) {
                stored.metadata.resource_version = Some(version);
            }
        }
        if state.vanish_on_get.remove(name) {
            state.resources.remove(name);
        }
        Ok(resource)
    }

    async fn list(&self) -> Result<Vec<Terraform>, AppError> {
        Ok(self.state().resources.values().cloned().collect())
    }

    async fn create(&self, resource: &Terraform) -> Result<Terraform, AppError> {
        let name = resource.name_any();
        if name.is_empty() {
            return Err(classify_status(
                422,
                "metadata.name: Required value: name or generateName is required",
                StoreAction::Create,
                &name,
            ));
        }
        let mut state = self.state();
        if state.resources.contains_key(&name) {
            return Err(classify_status(
                409,
                "already exists",
                StoreAction::Create,
                &name,
            ));
        }

        let mut stored = resource.clone();
        stored.metadata.generation = Some(1);
        stored.metadata.resource_version = Some(state.next_version());
        stored.metadata.creation_timestamp = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        state.resources.insert(name, stored.clone());
        Ok(stored)
    }

    async fn update(&self, resource: &Terraform) -> Result<Terraform, AppError> {
        let name = resource.name_any();
        require_name(StoreAction::Update, &name)?;
        let mut state = self.state();
        let current = state
            .resources
            .get(&name)
            .cloned()
            .ok_or_else(|| classify_status(404, "not found", StoreAction::Update, &name))?;
        if current.metadata.resource_version != resource.metadata.resource_version {
            return Err(classify_status(
                409,
                "the object has been modified; please apply your changes to the latest version",
                StoreAction::Update,
                &name,
            ));
        }

        let mut stored = resource.clone();
        stored.metadata.generation = Some(current.metadata.generation.unwrap_or(0) + 1);
        stored.metadata.resource_version = Some(state.next_version());
        state.resources.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<(), AppError> {
        require_name(StoreAction::Delete, name)?;
        self.state()
            .resources
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| classify_status(404, "not found", StoreAction::Delete, name))
    }

    async fn runner_logs(&self, name: &str) -> Result<Vec<RunnerLog>, AppError> {
        Ok(self
            .state()
            .runner_logs
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

/// The real client refuses to build a named request without a name.
fn require_name(action: StoreAction, name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::Validation(format!(
            "{action} : A non-empty name is required"
        )));
    }
    Ok(())
}
