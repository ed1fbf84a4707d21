use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::detect::TickState;
use crate::pipeline::{IncidentSink, LogSource, ObservationSink, Orchestrator, PipelineError, TickOutcome};
use crate::simulator::EventSource;

/// Main pipeline loop.
/// Pulls one event per interval and runs the tick on the blocking pool, since
/// a retrain is compute-bound. Ticks never overlap.
pub async fn run_pipeline_loop<S, E>(mut orchestrator: Orchestrator<S>, mut source: E, every: Duration)
where
    S: ObservationSink + IncidentSink + LogSource + Send + 'static,
    E: EventSource + Send + 'static,
{
    info!(interval_ms = every.as_millis() as u64, "Pipeline engine started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let now = Utc::now();
        let event = source.next_event(now);

        let (back, result) = match tokio::task::spawn_blocking(move || {
            let result = orchestrator.tick(&event, now);
            (orchestrator, result)
        })
        .await
        {
            Ok(pair) => pair,
            Err(e) => {
                error!("Tick task failed, stopping pipeline: {}", e);
                return;
            }
        };
        orchestrator = back;

        match result {
            Ok(outcome) => log_outcome(&outcome),
            Err(e) if e.is_recoverable() => warn!("Tick degraded: {}", e),
            Err(e) => error!("Tick rejected: {}", e),
        }
    }
}

fn log_outcome(outcome: &TickOutcome) {
    match outcome.state {
        TickState::Warmup => debug!("warming up"),
        TickState::Normal => debug!(score = ?outcome.assessment.score, "normal"),
        TickState::Suppressed => debug!(score = ?outcome.assessment.score, "suppressed"),
        TickState::Fired => {
            if let Some(incident) = &outcome.incident {
                info!(id = %incident.id, score = incident.score, "incident recorded");
            }
        }
    }
}

/// Drive `ticks` events through the orchestrator on a virtual clock that
/// starts at `start` and advances by `step` per tick. No sleeping.
pub fn replay<S, E>(
    orchestrator: &mut Orchestrator<S>,
    source: &mut E,
    start: DateTime<Utc>,
    step: chrono::Duration,
    ticks: usize,
) -> Result<Vec<TickOutcome>, PipelineError>
where
    S: ObservationSink + IncidentSink + LogSource,
    E: EventSource,
{
    let mut outcomes = Vec::with_capacity(ticks);
    let mut now = start;
    for _ in 0..ticks {
        let event = source.next_event(now);
        outcomes.push(orchestrator.tick(&event, now)?);
        now += step;
    }
    Ok(outcomes)
}
