//! docview: convert office documents to PDF through a content-addressed cache.
//!
//! Configuration comes from the environment (and `.env`); see `Config::from_env`.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use docview_cli::{file_filter, print_json, App};
use docview_core::Config;
use docview_infra::{init_telemetry, shutdown_telemetry};
use docview_worker::ConversionJob;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "docview", about = "Document conversion cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a local file and register it
    Convert {
        file: PathBuf,
        /// Name to record instead of the file's own name
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a document from a URL and convert it
    Fetch { url: String },
    /// Treat a local file as an upload (copied into the upload directory first)
    Upload {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a registered file
    Get { file_id: String },
    /// List registered files, most recently accessed first
    List {
        /// Filter by type: pdf, word, excel, powerpoint, image, text, other
        #[arg(long)]
        r#type: Option<String>,
        /// Filter by stored extension, e.g. pdf or .xlsx
        #[arg(long)]
        ext: Option<String>,
        /// Filter by source URL
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Delete a file record, its index entries and its stored artifact
    Delete { file_id: String },
    /// Expire old records and trim the cache
    Cleanup {
        /// Override the configured retention for this run
        #[arg(long)]
        retention_days: Option<u32>,
        /// Keep running, cleaning up on the configured interval
        #[arg(long, conflicts_with = "retention_days")]
        daemon: bool,
    },
    /// Cache statistics
    Stats,
    /// Run a conversion as a background task and report its progress
    Submit(SubmitArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SubmitArgs {
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    file_id: Option<String>,
}

impl SubmitArgs {
    fn into_job(self) -> anyhow::Result<ConversionJob> {
        match (self.file, self.url, self.file_id) {
            (Some(path), _, _) => Ok(ConversionJob::File {
                path,
                original_name: None,
            }),
            (_, Some(url), _) => Ok(ConversionJob::Url { url }),
            (_, _, Some(file_id)) => Ok(ConversionJob::Existing { file_id }),
            _ => Err(anyhow::anyhow!("One of --file, --url or --file-id is required")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry(config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let app = App::build(config).await?;
    let result = run(&app, cli.command).await;

    shutdown_telemetry().await;
    result
}

async fn run(app: &App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Convert { file, name } => {
            let response = app.processor.process_file(&file, name.as_deref()).await;
            print_json(&response)?;
        }
        Commands::Fetch { url } => {
            let response = app.processor.process_url(&url).await;
            print_json(&response)?;
        }
        Commands::Upload { file, name } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let response = app.processor.process_upload(&data, &filename).await;
            print_json(&response)?;
        }
        Commands::Get { file_id } => {
            match app.mapping.get_record(&file_id).await {
                Some(record) => print_json(&record)?,
                None => print_json(&app.processor.get_file_by_id(&file_id).await)?,
            }
        }
        Commands::List {
            r#type,
            ext,
            url,
            limit,
            offset,
        } => {
            let filter = file_filter(r#type.as_deref(), ext.as_deref(), url)?;
            let page = app.mapping.list_files(limit, offset, &filter).await;
            print_json(&page)?;
        }
        Commands::Delete { file_id } => {
            let deleted = app.mapping.delete(&file_id).await;
            print_json(&serde_json::json!({ "file_id": file_id, "deleted": deleted }))?;
        }
        Commands::Cleanup {
            retention_days,
            daemon,
        } => {
            if daemon {
                let handle = Arc::new(app.cleanup_service()).start();
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for shutdown signal")?;
                tracing::info!("Shutting down cleanup loop");
                handle.abort();
            } else if let Some(days) = retention_days {
                let files_removed = app.mapping.cleanup(Some(days)).await;
                let cache = app.cache.cleanup().await;
                print_json(&serde_json::json!({
                    "files_removed": files_removed,
                    "cache": cache,
                }))?;
            } else {
                let summary = app.cleanup_service().run_once().await;
                print_json(&summary)?;
            }
        }
        Commands::Stats => {
            let stats = app.cache.get_statistics().await;
            print_json(&stats)?;
        }
        Commands::Submit(args) => {
            let submitted = app.runner.submit(args.into_job()?).await;
            let task_id = submitted
                .task_id
                .context("Task runner returned no task id")?;

            let mut last_progress = None;
            let task = loop {
                let task = app
                    .tasks
                    .get(&task_id)
                    .await
                    .with_context(|| format!("Task {} disappeared", task_id))?;
                if task.status.is_finished() {
                    break task;
                }
                if last_progress != Some(task.progress) {
                    last_progress = Some(task.progress);
                    tracing::info!(
                        task_id = %task_id,
                        status = %task.status,
                        progress = task.progress,
                        "Waiting for task"
                    );
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            };
            print_json(&task)?;
        }
    }

    Ok(())
}
