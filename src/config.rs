use std::io::IsTerminal;
use std::time::Duration;

use crate::cli::{Cli, ColorMode};
use crate::errors::TrackError;
use crate::follow::OutputConfig;
use crate::types::DeletedPolicy;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TargetKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Pod,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kind: TargetKind,
    pub name: String,
    pub namespace: String,
    pub timeout: Option<Duration>,
    pub logs_since_now: bool,
    pub stop_on_ready: bool,
    pub on_deleted: DeletedPolicy,
    pub output: OutputConfig,
}

impl TryFrom<Cli> for Config {
    type Error = TrackError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let (kind, name) = parse_target(&cli.target)?;

        let color = match cli.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => !cli.json && std::io::stdout().is_terminal(),
        };

        Ok(Config {
            kind,
            name,
            namespace: cli.namespace,
            timeout: cli.timeout.map(Duration::from_secs),
            logs_since_now: cli.logs_since_now,
            stop_on_ready: cli.stop_on_ready,
            on_deleted: if cli.stop_on_delete {
                DeletedPolicy::Stop
            } else {
                DeletedPolicy::Fail
            },
            output: OutputConfig {
                json: cli.json,
                color: color && !cli.json,
                timestamps: cli.timestamps,
            },
        })
    }
}

fn parse_target(target: &str) -> Result<(TargetKind, String), TrackError> {
    let (kind, name) = target.split_once('/').ok_or_else(|| {
        TrackError::Other(format!(
            "invalid target `{target}`: expected KIND/NAME, e.g. deploy/web"
        ))
    })?;

    let kind = match kind {
        "deploy" | "deployment" => TargetKind::Deployment,
        "sts" | "statefulset" => TargetKind::StatefulSet,
        "ds" | "daemonset" => TargetKind::DaemonSet,
        "po" | "pod" => TargetKind::Pod,
        other => {
            return Err(TrackError::Other(format!(
                "unsupported kind `{other}`: expected deploy, sts, ds or po"
            )))
        }
    };

    if name.is_empty() {
        return Err(TrackError::Other(format!("invalid target `{target}`: empty name")));
    }

    Ok((kind, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_aliases() {
        assert_eq!(
            parse_target("deploy/web").unwrap(),
            (TargetKind::Deployment, "web".to_string())
        );
        assert_eq!(
            parse_target("statefulset/db").unwrap(),
            (TargetKind::StatefulSet, "db".to_string())
        );
        assert_eq!(
            parse_target("po/web-1").unwrap(),
            (TargetKind::Pod, "web-1".to_string())
        );
    }

    #[test]
    fn rejects_malformed_targets() {
        assert!(parse_target("web").is_err());
        assert!(parse_target("job/x").is_err());
        assert!(parse_target("deploy/").is_err());
    }
}
