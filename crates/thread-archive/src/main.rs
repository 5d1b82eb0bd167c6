// thread-archive/crates/thread-archive/src/main.rs

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use thread_archive::{config::Config, run_thread_server, SharedState};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "thread-archive", version, about = "Conversation archive and hybrid search")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Search archived chunks and memories
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<i64>,
        #[arg(short, long)]
        thread: Option<String>,
    },
    /// Print one archived chunk as JSON
    Chunk { thread: String, chunk: String },
    /// Print index statistics
    Stats,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    thread_archive::telemetry::init_tracing();
    let cfg = Config::from_env()?;
    thread_archive::metrics::init_metrics();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_thread_server(cfg).await,
        Command::Search { query, limit, thread } => {
            let limit = limit.map(thread_archive::search::check_limit).transpose()?;
            let state = SharedState::from_config(cfg)?;
            let results = state.search.search(&query, limit, thread.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            state.shutdown()
        }
        Command::Chunk { thread, chunk } => {
            let store = thread_archive::ChunkStore::new(cfg.chunks_root());
            match store.read_chunk(&thread, &chunk) {
                Some(chunk) => println!("{}", serde_json::to_string_pretty(&chunk)?),
                None => anyhow::bail!("chunk {} not found in thread {}", chunk, thread),
            }
            Ok(())
        }
        Command::Stats => {
            let index = thread_archive::IndexStore::open_with_config(&cfg)?;
            println!("{}", serde_json::to_string_pretty(&index.stats()?)?);
            index.close()
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
