use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::capture::RetryPolicy;
use crate::model::DEFAULT_VIEWER_HOST;

#[derive(Clone, Debug, Parser)]
#[command(name = "streetview-collector")]
#[command(version, about = "Collect panorama links for nearby candidate points", long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// JSON store with the seeds to annotate (otherwise picked in the window)
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Directory that receives downloaded images (otherwise picked in the window)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Host serving the panorama viewer
    #[arg(long, default_value = DEFAULT_VIEWER_HOST)]
    pub viewer_host: String,

    /// Timeout for a single image download
    #[arg(long, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// Skip TLS certificate checks when downloading images
    #[arg(long)]
    pub accept_invalid_certs: bool,

    /// Reads of the image source before giving up
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub capture_attempts: u32,

    /// Pause between two reads of the image source
    #[arg(long, default_value_t = 2000)]
    pub capture_spacing_ms: u64,
}

/// Without a subcommand the collector window opens.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Write the image url of every captured candidate, one per line
    Export(ExportArgs),

    /// Build the price annotation question page from a link list
    Question(QuestionArgs),
}

#[derive(Clone, Debug, Args)]
pub struct ExportArgs {
    /// JSON store to read
    #[arg(value_name = "FILE")]
    pub store: PathBuf,

    /// Link list to write
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

#[derive(Clone, Debug, Args)]
pub struct QuestionArgs {
    /// File with one image url per line
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Question template containing ===LINKS===, ===ANSWERS=== and ===NUMLINKS===
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,

    /// Where to write the page (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.capture_attempts,
            spacing: Duration::from_millis(self.capture_spacing_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_capture_policy() {
        let config = Config::parse_from(["streetview-collector"]);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.viewer_host, DEFAULT_VIEWER_HOST);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert!(config.store.is_none());
        assert!(!config.accept_invalid_certs);
        assert!(config.command.is_none());
    }

    #[test]
    fn parses_export_subcommand() {
        let config = Config::parse_from([
            "streetview-collector",
            "export",
            "runs/batch.json",
            "--output",
            "links.txt",
        ]);
        let Some(Command::Export(args)) = config.command else {
            panic!("expected export command");
        };
        assert_eq!(args.store, PathBuf::from("runs/batch.json"));
        assert_eq!(args.output, PathBuf::from("links.txt"));
    }

    #[test]
    fn parses_question_subcommand() {
        let config = Config::parse_from([
            "streetview-collector",
            "question",
            "-i",
            "links.txt",
            "-t",
            "hit.html",
        ]);
        let Some(Command::Question(args)) = config.command else {
            panic!("expected question command");
        };
        assert_eq!(args.input, PathBuf::from("links.txt"));
        assert_eq!(args.template, PathBuf::from("hit.html"));
        assert!(args.output.is_none());
    }

    #[test]
    fn reads_paths_and_overrides() {
        let config = Config::parse_from([
            "streetview-collector",
            "--store",
            "runs/batch.json",
            "--output-dir",
            "images",
            "--capture-attempts",
            "3",
        ]);
        assert_eq!(config.store, Some(PathBuf::from("runs/batch.json")));
        assert_eq!(config.output_dir, Some(PathBuf::from("images")));
        assert_eq!(config.retry_policy().attempts, 3);
    }

    #[test]
    fn rejects_zero_attempts() {
        let result = Config::try_parse_from(["streetview-collector", "--capture-attempts", "0"]);
        assert!(result.is_err());
    }
}
