use axum::Router;
use axum::routing::get;
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppState};

/// Named routes, shared by the router and the `reverse` template helper.
pub const ROUTES: [(&str, &str); 9] = [
    ("index", "/"),
    ("create", "/create"),
    ("get", "/get"),
    ("list", "/list"),
    ("createnew", "/createnew"),
    ("edit", "/edit"),
    ("getedit", "/getedit"),
    ("delete", "/delete"),
    ("logs", "/logs"),
];

pub fn path_for(name: &str) -> Option<&'static str> {
    ROUTES
        .iter()
        .find(|(route, _)| *route == name)
        .map(|(_, path)| *path)
}

/// Builds the URL of a named route with the given query parameters.
pub fn reverse(name: &str, params: &[(String, String)]) -> Option<String> {
    let path = path_for(name)?;
    if params.is_empty() {
        return Some(path.to_string());
    }

    let query = params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    Some(format!("{path}?{query}"))
}

fn route(name: &str) -> &'static str {
    path_for(name).unwrap_or("/")
}

pub fn router(state: AppState, views_dir: &Path, assets_dir: &Path) -> Router {
    Router::new()
        .route(route("get"), get(handlers::get_terraform))
        .route(route("list"), get(handlers::list_terraforms))
        .route(route("createnew"), get(handlers::create_terraform))
        .route(route("edit"), get(handlers::edit_terraform))
        .route(route("getedit"), get(handlers::apply_edit))
        .route(route("delete"), get(handlers::delete_terraform))
        .route(route("logs"), get(handlers::terraform_logs))
        .with_state(state)
        .route_service(route("index"), ServeFile::new(assets_dir.join("index.html")))
        .route_service(route("create"), ServeFile::new(views_dir.join("create.html")))
        .nest_service("/img", ServeDir::new(assets_dir.join("img")))
        .layer(TraceLayer::new_for_http())
}
