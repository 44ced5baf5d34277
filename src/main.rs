use anyhow::Result;
use clap::Parser;
use quiz_recorder::{Environment, PlaceholderScanner, Settings, Widget};
use tracing::{info, warn};

/// Inspect a question's recording widgets without a browser attached:
/// scans the markup and prints the widget plan the coordinator would build.
#[derive(Parser)]
#[command(name = "quiz-recorder", version, about = "Recording widget inspector")]
struct Args {
    /// Settings file, without extension
    #[arg(long, default_value = "config/quiz-recorder")]
    config: String,

    /// Question markup to scan for placeholders
    #[arg(long, default_value = "<p>Say your answer: [[answer:audio:1m30s]]</p>")]
    markup: String,

    /// Treat pausing as allowed on this question
    #[arg(long)]
    allow_pausing: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    info!("quiz-recorder v0.1.0");
    info!(
        "Capture: {} Hz, {} channel(s)",
        settings.capture.sample_rate, settings.capture.channels
    );

    let environment = Environment::default();
    match environment.verify() {
        Ok(()) => info!("Environment supports recording"),
        Err(e) => warn!("Environment cannot record: {}", e),
    }

    let scanner = PlaceholderScanner::new()?;
    let specs = scanner.scan(&args.markup)?;

    if specs.is_empty() {
        info!("No recording placeholders in the given markup");
        return Ok(());
    }

    for spec in &specs {
        let widget = Widget::from_spec(spec, &settings, args.allow_pausing);
        info!(
            "Widget '{}': {} up to {}s, size cap {}",
            widget.name,
            widget.kind,
            widget.max_duration.as_secs(),
            match widget.size_limit() {
                Some(limit) => format!("{} bytes", limit),
                None => "unlimited".to_string(),
            }
        );
    }

    Ok(())
}
