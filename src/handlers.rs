use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Response};
use chrono::Local;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::k8s::{Connector, TerraformStore};
use crate::model::{
    CreateRequest, EditRequest, RunnerLog, TerraformDetail, TerraformSummary, yaml_detail,
};
use crate::view::{
    CREATE_DONE_VIEW, DELETE_DONE_VIEW, EDIT_DONE_VIEW, EDIT_VIEW, GET_VIEW, LIST_VIEW, LOGS_VIEW,
    ViewRenderer,
};

#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub namespace: String,
    pub env_slots: usize,
    pub edit_name_suffix: String,
}

#[derive(Clone)]
pub struct AppState {
    connector: Arc<dyn Connector>,
    views: Arc<ViewRenderer>,
    settings: Arc<HandlerSettings>,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn Connector>,
        views: Arc<ViewRenderer>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            connector,
            views,
            settings: Arc::new(settings),
        }
    }

    async fn connect(&self) -> Result<Box<dyn TerraformStore>, AppError> {
        self.connector.connect().await
    }

    fn respond(&self, action: &str, result: Result<Html<String>, AppError>) -> Response {
        match result {
            Ok(page) => page.into_response(),
            Err(failure) => {
                if failure.is_client_error() {
                    warn!(action, error = %failure, "request failed");
                } else {
                    error!(action, error = %failure, "request failed");
                }
                self.views.error_page(&failure)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NameQuery {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct NameView<'a> {
    name: &'a str,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct ListView {
    namespace: String,
    rendered_at: String,
    count: usize,
    rows: Vec<TerraformSummary>,
}

#[derive(Debug, Serialize)]
struct LogsView {
    #[serde(flatten)]
    detail: TerraformDetail,
    yaml: String,
    runners: Vec<RunnerLog>,
    runner_error: Option<String>,
}

pub async fn get_terraform(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Response {
    let result = show_detail(&state, &query.name, GET_VIEW).await;
    state.respond("get", result)
}

pub async fn edit_terraform(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Response {
    let result = show_detail(&state, &query.name, EDIT_VIEW).await;
    state.respond("edit", result)
}

pub async fn list_terraforms(State(state): State<AppState>) -> Response {
    let result = list(&state).await;
    state.respond("list", result)
}

pub async fn create_terraform(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request = CreateRequest::from_params(&params, state.settings.env_slots);
    let result = create(&state, request).await;
    state.respond("create", result)
}

pub async fn apply_edit(
    State(state): State<AppState>,
    Query(request): Query<EditRequest>,
) -> Response {
    let result = update(&state, request).await;
    state.respond("update", result)
}

pub async fn delete_terraform(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Response {
    let result = delete(&state, &query.name).await;
    state.respond("delete", result)
}

pub async fn terraform_logs(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Response {
    let result = logs(&state, &query.name).await;
    state.respond("logs", result)
}

async fn show_detail(
    state: &AppState,
    name: &str,
    view: &str,
) -> Result<Html<String>, AppError> {
    let store = state.connect().await?;
    let resource = store.get(name).await?;
    debug!(name = %resource.name_any(), view, "fetched terraform resource");

    let detail = TerraformDetail::from_resource(&resource, &state.settings.edit_name_suffix);
    state.views.render(view, &detail)
}

async fn list(state: &AppState) -> Result<Html<String>, AppError> {
    let store = state.connect().await?;
    let resources = store.list().await?;

    let rows = resources
        .iter()
        .map(TerraformSummary::from_resource)
        .collect::<Vec<_>>();
    for row in &rows {
        debug!(
            name = %row.name,
            namespace = %row.namespace,
            generation = %row.generation,
            created = %row.created,
            phase = %row.phase,
            "listed terraform resource"
        );
    }
    info!(count = rows.len(), "listed terraform resources");

    state.views.render(
        LIST_VIEW,
        &ListView {
            namespace: state.settings.namespace.clone(),
            rendered_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            count: rows.len(),
            rows,
        },
    )
}

async fn create(state: &AppState, request: CreateRequest) -> Result<Html<String>, AppError> {
    let store = state.connect().await?;
    let resource = request.into_resource(&state.settings.namespace);
    let created = store.create(&resource).await?;

    let name = created.name_any();
    let namespace = created
        .namespace()
        .unwrap_or_else(|| state.settings.namespace.clone());
    info!(%name, %namespace, "terraform resource created");
    state.views.render(
        CREATE_DONE_VIEW,
        &NameView {
            name: &name,
            namespace: &namespace,
        },
    )
}

async fn update(state: &AppState, request: EditRequest) -> Result<Html<String>, AppError> {
    let name = request.target_name(&state.settings.edit_name_suffix);
    let store = state.connect().await?;

    let mut resource = store.get(&name).await?;
    request.apply(&mut resource);
    let updated = store.update(&resource).await?;

    info!(
        %name,
        module = %updated.spec.terraform_module,
        "terraform resource updated"
    );
    state.views.render(
        EDIT_DONE_VIEW,
        &NameView {
            name: &name,
            namespace: &state.settings.namespace,
        },
    )
}

async fn delete(state: &AppState, name: &str) -> Result<Html<String>, AppError> {
    let store = state.connect().await?;
    let resource = store.get(name).await?;
    let name = resource.name_any();

    match store.delete(&name).await {
        Ok(()) => info!(%name, "terraform resource deleted"),
        Err(AppError::NotFound(_)) => info!(%name, "terraform resource was already gone"),
        Err(other) => return Err(other),
    }

    state.views.render(
        DELETE_DONE_VIEW,
        &NameView {
            name: &name,
            namespace: &state.settings.namespace,
        },
    )
}

async fn logs(state: &AppState, name: &str) -> Result<Html<String>, AppError> {
    let store = state.connect().await?;
    let resource = store.get(name).await?;

    let (runners, runner_error) = match store.runner_logs(&resource.name_any()).await {
        Ok(runners) => (runners, None),
        Err(failure) => {
            warn!(name, error = %failure, "failed to load runner logs");
            (Vec::new(), Some(failure.to_string()))
        }
    };

    state.views.render(
        LOGS_VIEW,
        &LogsView {
            detail: TerraformDetail::from_resource(&resource, &state.settings.edit_name_suffix),
            yaml: yaml_detail(&resource),
            runners,
            runner_error,
        },
    )
}
