use anyhow::{Context as _, Result};
use axum::response::{Html, IntoResponse, Response};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderErrorReason,
};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, error};

use crate::error::AppError;
use crate::routes;

pub const GET_VIEW: &str = "get.html";
pub const LIST_VIEW: &str = "list.html";
pub const CREATE_DONE_VIEW: &str = "createDone.html";
pub const EDIT_VIEW: &str = "edit.html";
pub const EDIT_DONE_VIEW: &str = "editDone.html";
pub const DELETE_DONE_VIEW: &str = "deleteDone.html";
pub const LOGS_VIEW: &str = "logs.html";
pub const ERROR_VIEW: &str = "error.html";

const REQUIRED_VIEWS: [&str; 8] = [
    GET_VIEW,
    LIST_VIEW,
    CREATE_DONE_VIEW,
    EDIT_VIEW,
    EDIT_DONE_VIEW,
    DELETE_DONE_VIEW,
    LOGS_VIEW,
    ERROR_VIEW,
];

/// Template set parsed once at startup and shared read-only afterwards.
pub struct ViewRenderer {
    registry: Handlebars<'static>,
}

#[derive(Debug, Serialize)]
struct ErrorView<'a> {
    status: u16,
    kind: &'a str,
    message: String,
}

impl ViewRenderer {
    /// Registers every `*.html` file in `dir` under its file name.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut files = fs::read_dir(dir)
            .with_context(|| format!("failed to read views directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|extension| extension == "html")
            })
            .collect::<Vec<_>>();
        files.sort();
        if files.is_empty() {
            anyhow::bail!("no *.html templates found in {}", dir.display());
        }

        let mut registry = Self::registry();
        for path in files {
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            registry
                .register_template_file(name, &path)
                .with_context(|| format!("failed to parse template {}", path.display()))?;
            debug!(template = name, "registered view");
        }

        Self::from_registry(registry)
    }

    fn registry() -> Handlebars<'static> {
        let mut registry = Handlebars::new();
        registry.register_helper("reverse", Box::new(ReverseHelper));
        registry
    }

    fn from_registry(registry: Handlebars<'static>) -> Result<Self> {
        let missing = REQUIRED_VIEWS
            .iter()
            .filter(|name| !registry.has_template(name))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            anyhow::bail!("missing required templates: {}", missing.join(", "));
        }

        Ok(Self { registry })
    }

    pub fn render<T>(&self, name: &str, model: &T) -> Result<Html<String>, AppError>
    where
        T: Serialize,
    {
        Ok(Html(self.registry.render(name, model)?))
    }

    /// Renders `error.html` with the error's status, or plain text if that fails too.
    pub fn error_page(&self, failure: &AppError) -> Response {
        let status = failure.status();
        let view = ErrorView {
            status: status.as_u16(),
            kind: failure.kind(),
            message: failure.to_string(),
        };

        match self.registry.render(ERROR_VIEW, &view) {
            Ok(body) => (status, Html(body)).into_response(),
            Err(render_error) => {
                error!(error = %render_error, "failed to render error page");
                (status, format!("{}: {failure}", failure.kind())).into_response()
            }
        }
    }
}

/// `{{reverse "get" name=metadata.name}}` expands to `/get?name=...`. Query values are
/// percent-encoded, so the output is safe inside an attribute without further escaping.
struct ReverseHelper;

impl HelperDef for ReverseHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        helper: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let route = helper
            .param(0)
            .and_then(|param| param.value().as_str())
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("reverse", 0))?;

        let params = helper
            .hash()
            .iter()
            .map(|(key, value)| (key.to_string(), query_value(value.value())))
            .collect::<Vec<_>>();
        let url = routes::reverse(route, &params)
            .ok_or_else(|| RenderErrorReason::Other(format!("unknown route '{route}'")))?;

        out.write(&url)?;
        Ok(())
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub fn shipped_views() -> ViewRenderer {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("views");
    ViewRenderer::load(&dir).expect("shipped views parse")
}
