//! `run` command handler.
//!
//! Drives the simulated retrospective form through all five phases and
//! prints the text that ended up in the writing field.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::RunArgs;
use crate::config::{AppConfig, EngineConfig, SimulationConfig};
use crate::error::RetroDriveError;
use crate::observability::EventEmitter;
use crate::page::{PageAdapter, SimulatedPage};
use crate::phase::{PhaseEngine, Workflow};

use super::build_generator;

/// Task offered when the operator is asked for one.
pub const DEFAULT_TASK: &str = "14.2.0 개발 및 디자인 수정";

/// Runs the engine until the form is complete, the run stalls, or `cancel`
/// fires.
///
/// # Errors
///
/// Returns a usage error for an empty task, an unknown start phase, or the
/// stall that ended the run.
pub async fn run(
    args: &RunArgs,
    config: AppConfig,
    events: Arc<EventEmitter>,
    cancel: CancellationToken,
) -> Result<(), RetroDriveError> {
    let task = match args.task {
        Some(ref task) => task.trim().to_string(),
        None => ask_task().await?,
    };
    if task.is_empty() {
        return Err(RetroDriveError::Usage("the task must not be empty".to_string()));
    }

    let engine_config = resolve_engine(args, config.engine.clone());
    let simulation = resolve_simulation(args, config.simulation.clone());

    let workflow = Workflow::retrospective(&config.answers);
    let start_phase = args
        .start_phase
        .clone()
        .unwrap_or_else(|| engine_config.start_phase.clone());
    // Fail before anything starts when the phase is misspelled
    workflow.index_of(&start_phase)?;

    let page = Arc::new(SimulatedPage::retrospective_form(
        &config.answers,
        simulation.render_delay,
        &engine_config.delay_overrides,
    ));
    let generator = build_generator(&args.source, &config, Arc::clone(&events));

    let page_adapter: Arc<dyn PageAdapter> = page.clone();
    let engine = Arc::new(
        PhaseEngine::new(workflow, page_adapter, generator, engine_config, task.as_str())
            .with_events(events),
    );

    tracing::info!(task = %task, phase = %start_phase, "starting form run");
    engine.start(&start_phase)?;

    tokio::select! {
        result = engine.wait() => {
            result?;
            print_summary(&page);
            Ok(())
        }
        () = cancel.cancelled() => {
            engine.terminate();
            tracing::info!(
                phase = engine.current_phase().map(|p| p.to_string()).as_deref().unwrap_or("<none>"),
                "run interrupted"
            );
            Ok(())
        }
    }
}

fn resolve_engine(args: &RunArgs, mut engine: EngineConfig) -> EngineConfig {
    if let Some(tick) = args.tick_interval {
        engine.tick_interval = tick;
    }
    if let Some(settle) = args.settle_delay {
        engine.settle_delay = settle;
    }
    if let Some(max) = args.max_ticks {
        engine.max_ticks_per_phase = max;
    }
    engine
}

fn resolve_simulation(args: &RunArgs, mut simulation: SimulationConfig) -> SimulationConfig {
    if let Some(delay) = args.render_delay {
        simulation.render_delay = delay;
    }
    simulation
}

/// Asks for the task on stdin. An empty answer takes [`DEFAULT_TASK`];
/// end of input means the operator declined.
async fn ask_task() -> Result<String, RetroDriveError> {
    let answer = tokio::task::spawn_blocking(|| {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "오늘 한 일 [{DEFAULT_TASK}]: ");
        let _ = stderr.flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    })
    .await
    .ok()
    .flatten();

    match answer {
        Some(line) if line.trim().is_empty() => Ok(DEFAULT_TASK.to_string()),
        Some(line) => Ok(line.trim().to_string()),
        None => Err(RetroDriveError::Usage("no task given".to_string())),
    }
}

fn print_summary(page: &SimulatedPage) {
    println!("Form completed ({} clicks).", page.clicks().len());
    println!();
    println!("{}", page.model_text());
}
