use annunciator::announcement::AnnouncementTemplate;
use annunciator::annunciator::Annunciator;
use annunciator::config::{GlobalOpts, Settings};
use annunciator::http::{create_router, AppState};
use annunciator::player::NullOutput;
use annunciator::sequencer::{PlaybackHandle, SequenceReport};
use annunciator::sync::{check_document, load_document};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "annunciator", about = "Railway PA announcement controller")]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP API (default)
    Serve,
    /// Play a station announcement now
    Station {
        #[arg(long)]
        train: String,
        /// eastbound or westbound
        #[arg(long)]
        direction: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        track: String,
    },
    /// Play a promotional announcement now
    Promo {
        #[arg(long)]
        file: String,
    },
    /// Play a safety announcement now
    Safety {
        #[arg(long, default_value = "english")]
        language: String,
    },
    /// Play the chime to check the audio output
    TestAudio,
    /// Validate every entry of the schedule file
    CheckSchedule,
    /// Show the jobs the persisted schedule registers
    Status,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let cli = Cli::parse();
    let settings = Settings::resolve(&cli.global)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let annunciator = Arc::new(Annunciator::new(settings)?);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(annunciator.clone()))?;
            annunciator.shutdown();
        }

        Commands::Station {
            train,
            direction,
            destination,
            track,
        } => {
            let template = AnnouncementTemplate::Station {
                train_number: train,
                direction,
                destination,
                track_number: track,
            };
            announce_and_wait(settings, &template)?;
        }

        Commands::Promo { file } => {
            announce_and_wait(settings, &AnnouncementTemplate::Promo { file })?;
        }

        Commands::Safety { language } => {
            announce_and_wait(settings, &AnnouncementTemplate::Safety { language })?;
        }

        Commands::TestAudio => {
            let annunciator = Annunciator::new(settings)?;
            if !annunciator.player().output().is_available() {
                eprintln!("Error: no audio output available");
                std::process::exit(1);
            }
            let report = wait_for(annunciator.test_audio()?);
            if report.played.is_empty() {
                eprintln!("Error: chime did not play ({})", describe(&report));
                std::process::exit(1);
            }
            println!("Audio test passed.");
        }

        Commands::CheckSchedule => {
            let path = settings.schedule_path();
            let document = load_document(&path)?;
            let checks = check_document(&document);
            println!("{}: {} entries", path.display(), checks.len());
            let mut invalid = 0;
            for c in &checks {
                let state = if c.enabled { "enabled " } else { "disabled" };
                match &c.error {
                    None => println!("  ok    {:<12} {} {:<16} {}", c.id, state, c.cron, c.summary),
                    Some(e) => {
                        invalid += 1;
                        println!("  FAIL  {:<12} {} {:<16} {}", c.id, state, c.cron, e);
                    }
                }
            }
            if invalid > 0 {
                eprintln!("{} invalid entr{}", invalid, if invalid == 1 { "y" } else { "ies" });
                std::process::exit(1);
            }
            println!("All entries valid.");
        }

        Commands::Status => {
            let annunciator = Annunciator::with_output(
                settings,
                Arc::new(NullOutput::default()),
            )?;
            annunciator.sync().reload()?;
            let status = annunciator.scheduler_status();
            if status.jobs.is_empty() {
                println!("No active jobs.");
            }
            for job in &status.jobs {
                println!("{:<12} {:<26} {:<16} next: {}", job.id, job.name, job.cron, job.next_run);
            }
        }
    }

    Ok(())
}

async fn serve(annunciator: Arc<Annunciator>) -> anyhow::Result<()> {
    let jobs = annunciator.start()?;
    info!(active_jobs = jobs, "scheduler running");

    let addr = annunciator.settings().bind_addr();
    let app = create_router(AppState::new(annunciator.clone()));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn announce_and_wait(settings: Settings, template: &AnnouncementTemplate) -> anyhow::Result<()> {
    let annunciator = Annunciator::new(settings)?;
    println!("Announcing: {}", template.summary());
    let report = wait_for(annunciator.announce(template)?);
    println!("Done: {}", describe(&report));
    Ok(())
}

fn wait_for(handle: PlaybackHandle) -> SequenceReport {
    handle.wait().unwrap_or_default()
}

fn describe(report: &SequenceReport) -> String {
    format!(
        "{} played, {} missing, {} failed",
        report.played.len(),
        report.missing.len(),
        report.failed.len()
    )
}
