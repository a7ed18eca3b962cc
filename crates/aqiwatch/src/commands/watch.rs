//! `aqiwatch watch`: long-running monitor.
//!
//! Keeps both channels alive through the manager's auto-retry, feeds every
//! realtime reading into the alert engine and prints what comes out.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use aqiwatch_api::AqiUpdate;
use aqiwatch_core::{
    AlertEngine, ConnectionSnapshot, Notification, NotificationInbox, NotificationSink, Priority,
    Reading, Subject,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::commands::{self, Manager};
use crate::error::CliError;
use crate::output;

/// Prints each notification as one line (or one compact JSON object).
struct LinePrinter {
    format: OutputFormat,
    color: bool,
}

impl NotificationSink for LinePrinter {
    fn on_notification(&self, notification: &Notification) {
        let line = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
                serde_json::to_string(notification).unwrap_or_default()
            }
            OutputFormat::Plain => notification.id.clone(),
            OutputFormat::Table => output::notification_line(notification, self.color),
        };
        output::print_output(&line, false);
    }
}

fn resubscribe(manager: &Manager, subjects: &[Subject]) {
    for subject in subjects {
        manager.subscribe_to_subject(subject);
    }
}

/// Why the monitor loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Shutdown,
    StreamClosed,
}

/// Live state of one `watch` session.
struct Monitor<'a> {
    manager: &'a Manager,
    subjects: &'a [Subject],
    engine: &'a mut AlertEngine,
    advisories: bool,
    realtime_up: bool,
}

impl Monitor<'_> {
    /// Evaluate readings and keep subscriptions current until `shutdown`
    /// resolves or the reading stream closes.
    async fn run(
        mut self,
        shutdown: impl Future<Output = ()>,
        mut status_rx: watch::Receiver<ConnectionSnapshot>,
        mut updates: broadcast::Receiver<Arc<AqiUpdate>>,
    ) -> Exit {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => return Exit::Shutdown,

                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return Exit::StreamClosed;
                    }
                    let now_up = status_rx.borrow_and_update().realtime_state.is_connected();
                    // Server-side subscriptions do not survive a reconnect.
                    if now_up && !self.realtime_up {
                        resubscribe(self.manager, self.subjects);
                    }
                    self.realtime_up = now_up;
                }

                update = updates.recv() => match update {
                    Ok(update) => self.on_update(&update),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "reading stream lagged; some readings were dropped");
                    }
                    Err(RecvError::Closed) => return Exit::StreamClosed,
                },
            }
        }
    }

    fn on_update(&mut self, update: &AqiUpdate) {
        let reading = Reading::from(update);
        tracing::debug!(subject = %reading.subject_id, value = reading.value, "reading");
        let Some(notification) = self.engine.evaluate(&reading) else {
            return;
        };
        if self.advisories && notification.priority >= Priority::High {
            self.engine.health_advisory(&reading);
        }
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = commands::resolve_config(global)?;
    let subjects = aqiwatch_config::subjects(&cfg)?;
    let rule = aqiwatch_config::alert_rule(&cfg)?;
    let (manager, realtime) = commands::build_manager(&cfg)?;

    let color = output::should_color(global.color);
    let mut engine = AlertEngine::new(rule);
    let inbox = Arc::new(NotificationInbox::default());
    engine.subscribe(inbox.clone());
    if !global.quiet {
        engine.subscribe(Arc::new(LinePrinter {
            format: global.output,
            color,
        }));
    }

    if !global.quiet && !args.no_status {
        manager.subscribe(Arc::new(move |snapshot: &ConnectionSnapshot| {
            output::print_output(&output::status_line(snapshot, color), false);
        }));
    }

    if subjects.is_empty() {
        tracing::warn!("no subjects configured; only unsolicited readings will arrive");
    }

    let updates = realtime.updates();
    let mut status_rx = manager.watch();

    manager.initialize().await;
    let realtime_up = manager.current_snapshot().realtime_state.is_connected();
    if realtime_up {
        resubscribe(&manager, &subjects);
    }
    status_rx.mark_unchanged();
    manager.start_auto_retry();

    tracing::info!(
        subjects = %aqiwatch_config::subject_labels(&cfg).join(", "),
        "watching"
    );

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for interrupt");
            std::future::pending::<()>().await;
        }
        tracing::info!("interrupted, shutting down");
    };
    let monitor = Monitor {
        manager: &manager,
        subjects: &subjects,
        engine: &mut engine,
        advisories: args.advisories,
        realtime_up,
    };
    let exit = monitor.run(shutdown, status_rx, updates).await;
    tracing::debug!(?exit, "monitor stopped");

    manager.dispose();
    engine.dispose();

    if !global.quiet {
        eprintln!("{} unread notification(s) in inbox", inbox.unread_count());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use aqiwatch_config::Config;

    use super::*;

    fn update(aqi: f64) -> Arc<AqiUpdate> {
        Arc::new(AqiUpdate {
            subject_id: "DL-001".into(),
            aqi,
            observed_at: Utc::now(),
            extra: serde_json::json!({}),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_wins_over_a_busy_stream() {
        let (manager, _realtime) = commands::build_manager(&Config::default()).unwrap();
        let (tx, rx) = broadcast::channel(16);
        let feeder = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(10));
            loop {
                tick.tick().await;
                if tx.send(update(42.0)).is_err() {
                    break;
                }
            }
        });

        let mut engine = AlertEngine::default();
        let monitor = Monitor {
            manager: &manager,
            subjects: &[],
            engine: &mut engine,
            advisories: false,
            realtime_up: false,
        };
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        let exit = monitor.run(shutdown, manager.watch(), rx).await;

        assert_eq!(exit, Exit::Shutdown);
        feeder.await.unwrap();
        manager.dispose();
    }

    #[tokio::test]
    async fn closed_stream_ends_after_pending_readings() {
        let (manager, _realtime) = commands::build_manager(&Config::default()).unwrap();
        let (tx, rx) = broadcast::channel(16);
        tx.send(update(180.0)).unwrap();
        drop(tx);

        let mut engine = AlertEngine::default();
        let inbox = Arc::new(NotificationInbox::default());
        engine.subscribe(inbox.clone());
        let monitor = Monitor {
            manager: &manager,
            subjects: &[],
            engine: &mut engine,
            advisories: true,
            realtime_up: false,
        };
        let exit = monitor
            .run(std::future::pending(), manager.watch(), rx)
            .await;

        assert_eq!(exit, Exit::StreamClosed);
        // The poor reading plus its advisory.
        assert_eq!(inbox.len(), 2);
        manager.dispose();
    }
}
