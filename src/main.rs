use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use storepulse::config::ConfigLoader;
use storepulse::notify::{LogNotifier, Notifier, WebhookNotifier};
use storepulse::{DashboardCollector, HarvestEngine};

#[derive(Parser)]
#[command(name = "storepulse")]
#[command(version = "0.1.0")]
#[command(about = "Concurrent store metrics harvester", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest all configured stores
    Run {
        /// Path to the configuration file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Show a progress bar (stderr)
        #[arg(short, long, default_value_t = true)]
        progress: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let multi = Arc::new(indicatif::MultiProgress::new());

    match cli.command {
        Commands::Run { config, progress } => {
            if progress {
                indicatif_log_bridge::LogWrapper::new((*multi).clone(), logger)
                    .try_init()
                    .map_err(|e| anyhow::anyhow!("logger init failed: {e}"))?;
            } else {
                log::set_boxed_logger(Box::new(logger))
                    .map_err(|e| anyhow::anyhow!("logger init failed: {e}"))?;
                log::set_max_level(log::LevelFilter::Info);
            }

            log::info!("Loading config from {:?}", config);
            let config_data = ConfigLoader::load(&config)?;
            log::info!("Loaded job: {}", config_data.name);

            let targets = storepulse::stores::load_stores(&config_data.stores_file)?;
            log::info!("Loaded {} stores from {}", targets.len(), config_data.stores_file);

            let collector = Arc::new(DashboardCollector::new(config_data.portal.clone())?);
            let sink =
                storepulse::sink::from_config(config_data.sink.as_ref(), Some(multi.clone()))
                    .await?;
            let notifier: Arc<dyn Notifier> = match &config_data.report_webhook_url {
                Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
                None => Arc::new(LogNotifier),
            };
            let engine = HarvestEngine::new(config_data, collector, sink, notifier);

            let mut progress_bar: Option<ProgressBar> = None;
            let mut _progress_task = None;
            if progress {
                let pb = multi.add(ProgressBar::new(targets.len() as u64));
                pb.set_style(ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                    .progress_chars("#>-"));

                let mut progress_rx = engine.progress();
                let pb_clone = pb.clone();
                progress_bar = Some(pb);
                _progress_task = Some(tokio::spawn(async move {
                    while progress_rx.changed().await.is_ok() {
                        let snapshot = progress_rx.borrow().clone();
                        pb_clone.set_length(snapshot.total_jobs);
                        pb_clone.set_position(snapshot.submitted);
                        pb_clone.set_message(format!(
                            "Collected: {} | Failed: {} | {:.1} stores/min",
                            snapshot.collected, snapshot.failed, snapshot.stores_per_minute
                        ));
                    }
                }));
            }

            log::info!("Starting harvest...");
            let summary = engine.run(targets).await?;

            if progress {
                if let Some(task) = _progress_task {
                    task.abort();
                }
                if let Some(pb) = progress_bar {
                    pb.finish_with_message(format!(
                        "Submitted: {} | Failed: {} - Completed",
                        summary.submitted,
                        summary.failures.len()
                    ));
                }
            }

            println!("\n✅ Harvest Completed:");
            println!(
                "   Submitted: {}/{} ({:.1}%)",
                summary.submitted, summary.total_jobs, summary.success_rate
            );
            println!("   Throughput: {:.1} stores/min", summary.stores_per_minute);
            println!(
                "   Collection: avg {:.2}s, p95 {:.2}s",
                summary.avg_collection_seconds, summary.p95_collection_seconds
            );
            println!(
                "   Volume: {} orders, {} units",
                summary.total_orders, summary.total_units
            );
            println!("   Total Time: {:.1}s", summary.elapsed_seconds);
            if !summary.failures.is_empty() {
                println!("   Failures:");
                for failure in &summary.failures {
                    println!("     - {}", failure);
                }
            }
        }
        Commands::Check { config } => match ConfigLoader::load(&config) {
            Ok(cfg) => {
                println!("✅ Config is valid:");
                println!("   Name: {}", cfg.name);
                println!("   Stores file: {}", cfg.stores_file);
                println!("   Portal: {}", cfg.portal.base_url);
                println!(
                    "   Concurrency: {} (auto {}-{}, enabled: {})",
                    cfg.concurrency.initial,
                    cfg.concurrency.auto.min_concurrency,
                    cfg.concurrency.auto.max_concurrency,
                    cfg.concurrency.auto.enabled
                );
            }
            Err(e) => {
                eprintln!("❌ Config error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
