use anyhow::Result;
use clap::Parser;
use plotgen::cache::CacheStore;
use plotgen::config::Config;
use plotgen::fingerprint::{self, Fingerprint, FingerprintStrategy};
use plotgen::llm::LlmClient;
use plotgen::matcher;
use plotgen::runner;
use plotgen::synth;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "plotgen",
    about = "Plot anything from the command line using natural language",
    version
)]
struct Args {
    /// Instructions for creating the plot
    instructions: String,

    /// Path to the data file (reads from stdin if not provided)
    path: Option<PathBuf>,

    /// Skip the cache and synthesize a fresh script
    #[arg(long)]
    skip_cache: bool,

    /// Strategy for deriving the structural pattern of the data
    #[arg(long, value_enum, default_value = "llm")]
    fingerprint: FingerprintStrategy,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    let data = read_data(args.path.as_deref())?;

    let lines: Vec<String> = data
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        anyhow::bail!("No data provided");
    }

    let config = Config::load();
    let store = CacheStore::open_default()?;
    let mut metadata = store.load();

    let cached = if args.skip_cache {
        None
    } else {
        matcher::find_cached_script(&store, &metadata, &args.instructions, &lines)
    };

    let script_path = match cached {
        Some(path) => path,
        None => {
            eprintln!("  No cached script found; deriving data pattern...");

            let client = LlmClient::from_config(&config)?;

            let Fingerprint {
                pattern,
                representative,
            } = match args.fingerprint {
                FingerprintStrategy::Llm => {
                    fingerprint::infer_pattern(&client, &lines, config.max_pattern_attempts)
                        .await?
                }
                FingerprintStrategy::Literal => fingerprint::literal_pattern(&lines),
            };

            if std::env::var("DEBUG").is_ok() {
                eprintln!("  Representative lines: {:?}", representative);
                eprintln!("  Regex: {}", pattern);
            }

            let body = synth::synthesize_script(
                &client,
                &args.instructions,
                &representative,
                &lines,
                config.max_repair_attempts,
                config.validation_timeout(),
            )
            .await?;

            store.commit(&body, &args.instructions, &pattern, &mut metadata)?
        }
    };

    runner::run_script(&script_path, &lines.join("\n"))
}

fn read_data(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("File {} does not exist", path.display());
            }
            Ok(std::fs::read_to_string(path)?)
        }
        None => {
            let mut data = String::new();
            std::io::stdin().read_to_string(&mut data)?;
            Ok(data)
        }
    }
}
