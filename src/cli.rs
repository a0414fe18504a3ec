use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "tfconsole",
    version,
    about = "A web console for Terraform custom resources in one Kubernetes namespace."
)]
pub struct CliArgs {
    /// Address to listen on (default 0.0.0.0:1323)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Namespace holding the Terraform resources (default "default")
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// kubeconfig context to use instead of the current one
    #[arg(long)]
    pub context: Option<String>,

    /// Directory with the *.html views
    #[arg(long)]
    pub views_dir: Option<PathBuf>,

    /// Directory with index.html and img/
    #[arg(long)]
    pub assets_dir: Option<PathBuf>,

    /// Number of envN Name/Value pairs accepted by /createnew
    #[arg(long)]
    pub env_slots: Option<usize>,

    /// Suffix appended to appName by /getedit
    #[arg(long)]
    pub edit_name_suffix: Option<String>,

    /// Connect and read timeout for API server calls, in seconds
    #[arg(long)]
    pub remote_timeout_secs: Option<u64>,

    /// Settings file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
