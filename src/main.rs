use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use valve_vision::{VisionConfig, VisionSystem};

#[derive(Parser, Debug)]
#[command(name = "valve-vision", about = "Identify valves from photos against a reference catalog")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the reference images directory
    #[arg(long, global = true)]
    images_dir: Option<PathBuf>,
    /// Override the index cache location
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild the index from the images directory and persist it.
    Index,
    /// Report how many classes are indexed (reads the cache, never rebuilds).
    Size,
    /// Recognize the valve in an image file.
    Recognize {
        image: PathBuf,
        /// Return up to K ranked candidates instead of the single best match
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List indexed classes with their representative image.
    Catalog,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => VisionConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => VisionConfig::default(),
    };
    if let Some(dir) = cli.images_dir {
        config.images_dir = dir;
    }
    if let Some(cache) = cli.cache {
        config.cache_path = cache;
    }

    let system = VisionSystem::new(config)?;

    match cli.command {
        Commands::Index => {
            let root = system.config().images_dir.clone();
            let summary = system
                .rebuild(&root)
                .with_context(|| format!("Failed to index {}", root.display()))?;
            for skip in &summary.skipped {
                println!("skipped {} ({})", skip.path.display(), skip.reason);
            }
            println!("indexed {} classes", summary.class_count);
        }
        Commands::Size => {
            println!("index size: {}", system.get_index_size());
        }
        Commands::Recognize { image, top_k } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read image {}", image.display()))?;
            match top_k {
                Some(k) => {
                    let results = system.recognize_topk(&bytes, k)?;
                    if results.is_empty() {
                        println!("no match");
                    }
                    for (rank, r) in results.iter().enumerate() {
                        println!("{}. {} (confidence {:.3})", rank + 1, r.class_id, r.confidence);
                    }
                }
                None => match system.recognize(&bytes)? {
                    Some(r) => println!("{} (confidence {:.3})", r.class_id, r.confidence),
                    None => println!("no match"),
                },
            }
        }
        Commands::Catalog => {
            for row in system.representatives() {
                println!("{}\t{}\t{}", row.class_id, row.image_count, row.representative_image);
            }
        }
    }

    Ok(())
}
