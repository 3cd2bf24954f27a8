use anstyle::{AnsiColor, Effects, Style};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Renders feed narration for one tracked resource, with stable per-pod
/// coloring so interleaved log lines stay readable.
pub struct LineFormatter {
    resource: String,
    color: bool,
    timestamps: bool,
}

impl LineFormatter {
    pub fn new(resource: impl Into<String>, color: bool, timestamps: bool) -> Self {
        Self {
            resource: resource.into(),
            color,
            timestamps,
        }
    }

    /// Narration about the resource itself, e.g. `deploy/web become READY`.
    pub fn narrate(&self, text: &str) -> String {
        let line = format!("{} {}", self.subject(&self.resource), text);
        self.stamped(line)
    }

    /// Narration about one pod of the resource.
    pub fn narrate_pod(&self, pod: &str, text: &str) -> String {
        let line = format!("{} {}", self.subject(&format!("po/{pod}")), text);
        self.stamped(line)
    }

    // Narration has no kubelet timestamp to carry over; stamp with the
    // local wall clock instead.
    fn stamped(&self, line: String) -> String {
        if !self.timestamps {
            return line;
        }
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "<bad-ts>".to_string());
        format!("{ts} {line}")
    }

    /// One log line, prefixed with its pod and container.
    pub fn log_line(&self, pod: &str, container: &str, timestamp: &str, data: &str) -> String {
        let prefix = self.subject(&format!("{pod} {container}"));
        if self.timestamps {
            format!("{timestamp} {prefix} {data}")
        } else {
            format!("{prefix} {data}")
        }
    }

    fn subject(&self, name: &str) -> String {
        if self.color {
            paint(name, style_for(name))
        } else {
            name.to_string()
        }
    }
}

fn paint(s: &str, style: Style) -> String {
    format!("{}{}{}", style.render(), s, style.render_reset())
}

fn style_for(key: &str) -> Style {
    let color = match stable_color_index(key) {
        0 => AnsiColor::Green,
        1 => AnsiColor::Cyan,
        2 => AnsiColor::Yellow,
        3 => AnsiColor::Magenta,
        4 => AnsiColor::Blue,
        _ => AnsiColor::Red,
    };

    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn stable_color_index(s: &str) -> usize {
    // Small stable hash (FNV-1a style), avoids extra deps.
    let mut h: u64 = 1469598103934665603;
    for &b in s.as_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    (h as usize) % 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_without_color() {
        let f = LineFormatter::new("deploy/web", false, false);
        assert_eq!(f.narrate("added"), "deploy/web added");
        assert_eq!(f.narrate_pod("web-1", "added"), "po/web-1 added");
        assert_eq!(f.log_line("web-1", "app", "ts", "hello"), "web-1 app hello");
    }

    #[test]
    fn timestamps_prefix_log_lines() {
        let f = LineFormatter::new("deploy/web", false, true);
        assert_eq!(
            f.log_line("web-1", "app", "2024-01-01T00:00:00Z", "hello"),
            "2024-01-01T00:00:00Z web-1 app hello"
        );
    }

    #[test]
    fn color_index_is_stable() {
        assert_eq!(stable_color_index("web-1"), stable_color_index("web-1"));
    }
}
