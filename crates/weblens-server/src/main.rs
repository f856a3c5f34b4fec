use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use weblens::config::{self, AdapterArgs, AgentArgs, ModelArgs};

#[derive(Parser, Debug)]
#[command(name = "weblens")]
#[command(about = "Summarize web text and fact-check it with search, Wikipedia and arXiv lookups", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, env = "WEBLENS_LOG_JSON")]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Run the HTTP service (`POST /summarize`).
    Serve(ServeCmd),
    /// Summarize one passage and print `{"summary": ...}`.
    Ask(AskCmd),
    /// Call a single lookup tool directly (no model involved).
    Tool(ToolCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    #[arg(long, env = "WEBLENS_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,
    #[command(flatten)]
    model: ModelArgs,
    #[command(flatten)]
    agent: AgentArgs,
    #[command(flatten)]
    adapters: AdapterArgs,
}

#[derive(clap::Args, Debug)]
struct AskCmd {
    /// Passage to summarize.
    #[arg(long)]
    text: String,
    /// Page the passage came from.
    #[arg(long)]
    url: Option<String>,
    #[command(flatten)]
    model: ModelArgs,
    #[command(flatten)]
    agent: AgentArgs,
    #[command(flatten)]
    adapters: AdapterArgs,
}

#[derive(clap::Args, Debug)]
struct ToolCmd {
    /// Tool name: web_search, news_search, read_url, wikipedia_lookup, arxiv_search.
    name: String,
    /// Tool arguments as a JSON object.
    #[arg(long, default_value = "{}")]
    args_json: String,
    #[command(flatten)]
    adapters: AdapterArgs,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();
    config::init_tracing(cli.log_json);
    if let Some(p) = dotenv {
        tracing::debug!(path = %p.display(), "loaded .env");
    }

    match cli.command {
        Commands::Serve(args) => {
            let agent = config::build_agent(&args.model, &args.agent, &args.adapters)?;
            tracing::info!(tools = ?agent.tools().names(), "agent ready");
            weblens::http::serve(args.bind, Arc::new(agent)).await?;
        }
        Commands::Ask(args) => {
            if args.text.trim().is_empty() {
                anyhow::bail!("Text is empty");
            }
            let agent = config::build_agent(&args.model, &args.agent, &args.adapters)?;
            let summary = agent
                .summarize(&args.text, args.url.as_deref())
                .await
                .context("Error summarizing")?;
            println!("{}", serde_json::json!({ "summary": summary }));
        }
        Commands::Tool(args) => {
            let raw: serde_json::Value =
                serde_json::from_str(&args.args_json).context("--args-json is not valid JSON")?;
            let registry = args.adapters.registry()?;
            let out = registry.call(&args.name, raw).await?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "weblens",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("weblens {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
