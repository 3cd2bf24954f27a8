use clap::{Parser, ValueEnum};

/// kube-rollout: follow the rollout of a Kubernetes workload.
#[derive(Debug, Clone, Parser)]
#[command(name = "kube-rollout", version, about)]
pub struct Cli {
    /// Resource to follow: deploy/NAME, sts/NAME, ds/NAME or po/NAME
    pub target: String,

    /// Namespace of the resource
    #[arg(short = 'n', long = "namespace", default_value = "default")]
    pub namespace: String,

    /// Give up after this many seconds
    #[arg(short = 't', long = "timeout")]
    pub timeout: Option<u64>,

    /// Only stream container logs produced after startup
    #[arg(long = "logs-since-now", default_value_t = false)]
    pub logs_since_now: bool,

    /// Stop cleanly as soon as the resource becomes ready
    #[arg(long = "stop-on-ready", default_value_t = false)]
    pub stop_on_ready: bool,

    /// Treat deletion of the resource as a clean stop instead of a failure
    #[arg(long = "stop-on-delete", default_value_t = false)]
    pub stop_on_delete: bool,

    /// Emit newline-delimited JSON feed events (NDJSON)
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,

    /// Prefix lines with timestamps
    #[arg(long = "timestamps", default_value_t = false)]
    pub timestamps: bool,

    /// Color mode for output
    #[arg(long = "color", value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}
