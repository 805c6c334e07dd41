use std::env;
use upload_export_core::domains::export::{ExportProgress, ExportRequest};
use upload_export_core::{initialize, Config};

/// Export uploads to the configured storage.
///
/// Usage: export_uploads [search term]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let search_query = env::args().nth(1);

    let config = Config::from_env()?;
    let context = initialize(&config).await?;

    let request = ExportRequest::new(search_query);
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ExportProgress>(64);
    let reporter = tokio::spawn(async move {
        while let Some(update) = progress_rx.recv().await {
            eprintln!(
                "[{:?}] {} rows, {} bytes",
                update.stage, update.rows_written, update.bytes_written
            );
        }
    });

    let result = context.export_service.export_with_progress(&request, progress_tx).await;
    let _ = reporter.await;

    match result {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("Export failed ({}): {}", e.kind(), e);
            std::process::exit(1);
        }
    }
}
