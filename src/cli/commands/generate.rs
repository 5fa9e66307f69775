//! `generate` command handler.

use std::sync::Arc;

use crate::cli::args::{GenerateArgs, OutputFormat};
use crate::config::AppConfig;
use crate::error::RetroDriveError;
use crate::observability::EventEmitter;

use super::build_generator;

/// Generates text for one task and prints it.
///
/// Generation itself cannot fail; an unreachable proxy or backend prints
/// the fallback text.
///
/// # Errors
///
/// Returns a usage error for a blank task.
pub async fn run(
    args: &GenerateArgs,
    config: &AppConfig,
    events: Arc<EventEmitter>,
) -> Result<(), RetroDriveError> {
    let task = args.task.trim();
    if task.is_empty() {
        return Err(RetroDriveError::Usage("the task must not be empty".to_string()));
    }

    let generator = build_generator(&args.source, config, events);
    let text = generator.generate(task).await;

    match args.format {
        OutputFormat::Human => println!("{text}"),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "task": task, "text": text }));
        }
    }
    Ok(())
}
