//! `aqiwatch status`: one probe of both channels.

use aqiwatch_core::{Channel, ConnectionSnapshot, OverallStatus};

use crate::cli::GlobalOpts;
use crate::commands;
use crate::error::CliError;
use crate::output;

/// Each failed channel's reason, e.g. `api: refused; realtime: timeout`.
fn offline_reason(snapshot: &ConnectionSnapshot) -> String {
    let reasons: Vec<String> = [Channel::Api, Channel::Realtime]
        .into_iter()
        .filter_map(|ch| snapshot.error(ch).map(|err| format!("{ch}: {err}")))
        .collect();
    if reasons.is_empty() {
        "no channel connected".into()
    } else {
        reasons.join("; ")
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = commands::resolve_config(global)?;
    let (manager, _realtime) = commands::build_manager(&cfg)?;

    manager.initialize().await;
    let snapshot = manager.current_snapshot();
    manager.dispose();

    let color = output::should_color(global.color);
    let rendered = output::render_single(
        global.output,
        &snapshot,
        |s| output::snapshot_detail(s, color),
        |s| s.overall().to_string(),
    );
    output::print_output(&rendered, global.quiet);

    if snapshot.overall() == OverallStatus::Offline {
        return Err(CliError::Offline {
            reason: offline_reason(&snapshot),
            api_url: cfg.backend.api_url,
            realtime_url: cfg.backend.realtime_url,
        });
    }
    Ok(())
}
