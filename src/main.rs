#[cfg(not(feature = "sqlite"))]
fn main() {
    eprintln!(
        "The soundprint CLI requires the \"sqlite\" feature. Rebuild with `--features sqlite` to enable the persistent store."
    );
}

#[cfg(feature = "sqlite")]
mod cli {
    use anyhow::Context;
    use clap::{Parser, Subcommand};
    use std::path::PathBuf;
    use std::sync::Arc;

    use soundprint::config::Config;
    use soundprint::indexer::{IndexStatus, Indexer};
    use soundprint::matching::RecognitionOutcome;
    use soundprint::recognizer::Recognizer;
    use soundprint::store::{FingerprintStore, SqliteStore};

    #[derive(Parser)]
    #[command(name = "soundprint")]
    #[command(about = "Landmark-based audio fingerprinting and recognition")]
    struct Args {
        /// Path to the fingerprint database
        #[arg(short, long, default_value = "soundprint.db")]
        db: PathBuf,

        /// Path to a JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Fingerprint a file or every audio file under a directory
        Index {
            /// File or directory to index
            path: PathBuf,

            /// Worker pool size for directory runs
            #[arg(short, long)]
            workers: Option<usize>,

            /// File extensions to index (repeatable)
            #[arg(short, long)]
            ext: Vec<String>,
        },
        /// Recognize which indexed source a clip came from
        Recognize {
            /// Query clip
            file: PathBuf,

            /// Recognize in fixed-length segments instead of one decision
            #[arg(long)]
            segments: bool,

            /// Segment length in milliseconds
            #[arg(long)]
            segment_ms: Option<u64>,

            /// Offset into the clip at which recognition starts
            #[arg(long)]
            start_ms: Option<u64>,

            /// Cap on the total milliseconds examined
            #[arg(long)]
            limit_ms: Option<u64>,

            /// Emit JSON instead of a table
            #[arg(long)]
            json: bool,
        },
        /// List indexed sources
        Sources,
    }

    pub fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();

        let args = Args::parse();

        let mut config = match &args.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        let store = Arc::new(
            SqliteStore::open(&args.db)
                .with_context(|| format!("opening store {}", args.db.display()))?,
        );

        match args.command {
            Command::Index { path, workers, ext } => {
                if let Some(workers) = workers {
                    config.indexer.workers = workers;
                }
                if !ext.is_empty() {
                    config.indexer.extensions = ext;
                }

                let indexer = Indexer::new(store, config);
                if path.is_dir() {
                    let outcomes = indexer.index_directory(&path)?;
                    let mut indexed = 0;
                    let mut skipped = 0;
                    let mut failed = 0;
                    for outcome in &outcomes {
                        match &outcome.status {
                            IndexStatus::Indexed { fingerprints, .. } => {
                                indexed += 1;
                                println!("indexed  {} ({fingerprints} fingerprints)", outcome.path.display());
                            }
                            IndexStatus::Skipped => {
                                skipped += 1;
                                println!("skipped  {}", outcome.path.display());
                            }
                            IndexStatus::Failed { error } => {
                                failed += 1;
                                println!("failed   {} ({error})", outcome.path.display());
                            }
                        }
                    }
                    println!("{indexed} indexed, {skipped} skipped, {failed} failed");
                } else {
                    match indexer.index_file(&path)? {
                        IndexStatus::Indexed { fingerprints, .. } => {
                            println!("indexed  {} ({fingerprints} fingerprints)", path.display());
                        }
                        IndexStatus::Skipped => println!("skipped  {}", path.display()),
                        IndexStatus::Failed { error } => println!("failed   {} ({error})", path.display()),
                    }
                }
            }

            Command::Recognize {
                file,
                segments,
                segment_ms,
                start_ms,
                limit_ms,
                json,
            } => {
                if let Some(ms) = segment_ms {
                    config.recognizer.segment_ms = ms;
                }
                if let Some(ms) = start_ms {
                    config.recognizer.start_ms = ms;
                }
                if limit_ms.is_some() {
                    config.recognizer.limit_ms = limit_ms;
                }

                let recognizer = Recognizer::new(store, config);
                if segments {
                    let results = recognizer.recognize_file_segments(&file)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&results)?);
                    } else {
                        println!("{:>10} {:>10} {:>10}  source", "start", "offset", "confidence");
                        for result in &results {
                            match &result.outcome {
                                RecognitionOutcome::Match(m) => println!(
                                    "{:>10.2} {:>10.2} {:>10}  {}",
                                    result.start_seconds, m.offset_seconds, m.confidence, m.source_name
                                ),
                                RecognitionOutcome::NoMatch => {
                                    println!("{:>10.2} {:>10} {:>10}  -", result.start_seconds, "-", "-")
                                }
                            }
                        }
                    }
                } else {
                    let outcome = recognizer.recognize_file(&file)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    } else {
                        match outcome {
                            RecognitionOutcome::Match(m) => println!(
                                "{} (offset {:.2}s, confidence {})",
                                m.source_name, m.offset_seconds, m.confidence
                            ),
                            RecognitionOutcome::NoMatch => println!("no match"),
                        }
                    }
                }
            }

            Command::Sources => {
                for source in store.list_sources()? {
                    println!("{:>6}  {}  {}", source.id, source.checksum, source.name);
                }
            }
        }

        Ok(())
    }
}

#[cfg(feature = "sqlite")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
