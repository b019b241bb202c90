//! Command-line maintenance for a local Hearth database.

use clap::{Parser, Subcommand};
use exn::ResultExt;
use hearth::config::Config;
use hearth::error::{ErrorKind, Result};
use hearth::{Collection, Hearth};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hearth", version, about = "Inspect, back up and restore local Hearth data")]
struct Args {
    /// Configuration file layered over the defaults
    #[arg(short, long, global = true, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a backup to a file
    Export {
        /// Only the structured data, as JSON, without images
        #[arg(long)]
        structured_only: bool,
        output: PathBuf,
    },
    /// Replace local data with the contents of a backup
    Restore { input: PathBuf },
    /// Show storage usage per collection and image category
    Stats,
    /// Delete abandoned staged uploads
    Sweep {
        /// Minimum age of a staged upload before it is deleted
        #[arg(long, default_value_t = 3600)]
        older_than_secs: u64,
    },
    /// Delete all local data
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Manage the sticker catalog
    #[command(subcommand)]
    Stickers(StickerCommand),
}

#[derive(Subcommand, Debug)]
enum StickerCommand {
    List,
    /// Import `meaning-url` lines from a text file
    Import { file: PathBuf },
    /// Add one sticker from an image file
    Add { image: PathBuf, meaning: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)))
        .with_writer(std::io::stderr)
        .init();

    if let Some(database) = args.database {
        config.storage.database = Some(database);
    }

    match run(args.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", *err);
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let hearth = Hearth::open(config).await?;
    let result = dispatch(command, &hearth).await;
    hearth.close().await;
    result
}

async fn dispatch(command: Command, hearth: &Hearth) -> Result<()> {
    match command {
        Command::Export { structured_only, output } => {
            let bytes = hearth.export(structured_only).await?;
            write_file(&output, &bytes).await?;
            println!("wrote {} bytes to {}", bytes.len(), output.display());
        },
        Command::Restore { input } => {
            let bytes = read_file(&input).await?;
            let report = hearth.restore(bytes).await?;
            println!(
                "restored {} entries in {} collections and {} images (format version {})",
                report.entries,
                report.collections.len(),
                report.images_imported,
                report.version,
            );
            for (key, reason) in &report.skipped_images {
                println!("skipped image {key}: {reason}");
            }
            for field in &report.unknown_fields {
                println!("ignored unknown field {field:?}");
            }
        },
        Command::Stats => {
            let stats = hearth.stats().await?;
            let collections: serde_json::Map<_, _> = stats
                .collections
                .iter()
                .map(|(collection, size)| (collection.as_str().to_string(), json!(size)))
                .collect();
            let images: serde_json::Map<_, _> = stats
                .images
                .0
                .iter()
                .map(|(category, s)| (category.to_string(), json!({ "count": s.count, "size": s.total_size })))
                .collect();
            let report = json!({
                "collections": collections,
                "collectionsSize": stats.collections_size(),
                "images": images,
                "imagesSize": stats.images.total_size(),
                "staged": stats.staged,
            });
            println!("{report:#}");
        },
        Command::Sweep { older_than_secs } => {
            let removed = hearth.sweep(Duration::from_secs(older_than_secs)).await?;
            println!("removed {removed} staged uploads");
        },
        Command::Reset { yes } => {
            if !yes {
                exn::bail!(ErrorKind::Validation("reset deletes all local data; pass --yes to confirm".to_string()));
            }
            hearth.reset().await?;
            println!("all collections and images were deleted");
        },
        Command::Stickers(StickerCommand::List) => {
            let stickers = hearth.stickers().list().await.map_err(ErrorKind::sticker)?;
            for sticker in &stickers {
                println!("{}\t{}\t{}", sticker.id, sticker.meaning, sticker.source);
            }
            println!("{} stickers in {}", stickers.len(), Collection::Stickers);
        },
        Command::Stickers(StickerCommand::Import { file }) => {
            let bytes = read_file(&file).await?;
            let text = String::from_utf8(bytes).or_raise(|| ErrorKind::Validation("import file is not UTF-8".to_string()))?;
            let report = hearth
                .stickers()
                .batch_import_stickers_from_url(&text)
                .await
                .map_err(ErrorKind::sticker)?;
            println!("imported {}, failed {}", report.success_count, report.failed_count);
            for error in &report.errors {
                println!("{error}");
            }
        },
        Command::Stickers(StickerCommand::Add { image, meaning }) => {
            let payload = read_file(&image).await?;
            let sticker = hearth
                .stickers()
                .add_sticker(&payload, &meaning)
                .await
                .map_err(ErrorKind::sticker)?;
            println!("added sticker {}", sticker.id);
        },
    }
    Ok(())
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .or_raise(|| ErrorKind::Io(path.display().to_string()))
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .or_raise(|| ErrorKind::Io(path.display().to_string()))
}
