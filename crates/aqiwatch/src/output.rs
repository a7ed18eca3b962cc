//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.
//! Live `watch` events bypass the dispatchers and print as single lines.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use aqiwatch_core::{Channel, ChannelState, ConnectionSnapshot, Notification, OverallStatus, Priority};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

fn paint_state(state: ChannelState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        ChannelState::Connected => text.green().to_string(),
        ChannelState::Connecting => text.yellow().to_string(),
        ChannelState::Error => text.red().to_string(),
        ChannelState::Disconnected => text.dimmed().to_string(),
    }
}

fn paint_overall(status: OverallStatus, color: bool) -> String {
    let text = status.to_string();
    if !color {
        return text;
    }
    match status {
        OverallStatus::AllConnected => text.green().bold().to_string(),
        OverallStatus::Degraded => text.yellow().bold().to_string(),
        OverallStatus::Offline => text.red().bold().to_string(),
    }
}

fn paint_priority(priority: Priority, color: bool) -> String {
    let text = format!("{priority:<8}");
    if !color {
        return text;
    }
    match priority {
        Priority::Low => text.dimmed().to_string(),
        Priority::Medium => text.cyan().to_string(),
        Priority::High => text.yellow().bold().to_string(),
        Priority::Critical => text.red().bold().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single serde-serializable item in the chosen format.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => id_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}

// ── Domain rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct NotificationRow {
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "Subject")]
    pub subject: String,
    #[tabled(rename = "Priority")]
    pub priority: String,
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Title")]
    pub title: String,
}

pub fn notification_row(n: &Notification) -> NotificationRow {
    NotificationRow {
        time: n.created_at.format("%Y-%m-%d %H:%M").to_string(),
        subject: n.subject_id.clone().unwrap_or_else(|| "-".into()),
        priority: n.priority.to_string(),
        category: n.category.to_string(),
        title: n.title.clone(),
    }
}

/// Multi-line status report used by `status` in table mode.
pub fn snapshot_detail(snapshot: &ConnectionSnapshot, color: bool) -> String {
    let channel = |ch: Channel| {
        let state = paint_state(snapshot.state(ch), color);
        match snapshot.error(ch) {
            Some(err) => format!("{state} ({err})"),
            None => state,
        }
    };
    let mut lines = vec![
        format!("Overall:   {}", paint_overall(snapshot.overall(), color)),
        format!("API:       {}", channel(Channel::Api)),
        format!("Realtime:  {}", channel(Channel::Realtime)),
    ];
    lines.push(format!(
        "Checked:   {}",
        snapshot.last_checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.join("\n")
}

// ── Live event lines ─────────────────────────────────────────────────

pub fn status_line(snapshot: &ConnectionSnapshot, color: bool) -> String {
    let mut line = format!(
        "status    {}  api={}  realtime={}",
        paint_overall(snapshot.overall(), color),
        paint_state(snapshot.api_state, color),
        paint_state(snapshot.realtime_state, color),
    );
    if let Some(ref err) = snapshot.last_error {
        line.push_str(&format!("  ({err})"));
    }
    line
}

pub fn notification_line(n: &Notification, color: bool) -> String {
    let time = n.created_at.format("%H:%M:%S").to_string();
    let time = if color { time.dimmed().to_string() } else { time };
    format!(
        "{time}  {}  {}: {}",
        paint_priority(n.priority, color),
        n.title,
        n.message
    )
}
