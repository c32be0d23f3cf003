use anyhow::Context;
use clap::Parser;
use eframe::egui;
use tracing_subscriber::EnvFilter;

use streetview_collector::app::CollectorApp;
use streetview_collector::config::{Command, Config, ExportArgs, QuestionArgs};
use streetview_collector::export;

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    match &config.command {
        Some(Command::Export(args)) => return run_export(args),
        Some(Command::Question(args)) => return run_question(args),
        None => {}
    }

    if let Some(store) = &config.store {
        if !store.exists() {
            anyhow::bail!("File not found: {}", store.display());
        }
    }

    let title = match &config.store {
        Some(store) => format!(
            "Street View Collector — {}",
            store.file_name().unwrap_or_default().to_string_lossy()
        ),
        None => "Street View Collector".to_string(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 728.0])
            .with_title(&title),
        ..Default::default()
    };

    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Ok(Box::new(CollectorApp::new(cc, config)))),
    )
    .map_err(|err| anyhow::anyhow!("{err}"))
    .context("failed to run eframe")
}

// ── Batch Commands ──────────────────────────────────────────────────────────

fn run_export(args: &ExportArgs) -> anyhow::Result<()> {
    let written = export::export_links(&args.store, &args.output)?;
    println!("{written} image links written to {}", args.output.display());
    Ok(())
}

fn run_question(args: &QuestionArgs) -> anyhow::Result<()> {
    let links = export::read_link_list(&args.input)?;
    let template = std::fs::read_to_string(&args.template)
        .with_context(|| format!("failed to read template {}", args.template.display()))?;
    let page = export::render_question(&template, &links);
    match &args.output {
        Some(path) => std::fs::write(path, page)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{page}"),
    }
    Ok(())
}
