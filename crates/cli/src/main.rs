use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{api, bind_with_fallback, logging, web};
use ragbot_core::config::{self, AppConfig};
use ragbot_core::feedback::FeedbackLog;
use ragbot_core::{converter, ingest, pipeline};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    let log_file = match cli.command {
        Commands::Serve { .. } => cfg.api.log_path().map(str::to_string),
        _ => None,
    };
    logging::init(log_file.as_deref())?;

    match cli.command {
        Commands::Convert {
            input,
            output,
            json,
        } => run_convert(cfg, input, output, json).await,
        Commands::Ingest { json } => run_ingest(cfg, json).await,
        Commands::Serve { port } => run_serve(cfg, port).await,
        Commands::Web { port, api_url } => run_web(cfg, port, api_url).await,
        Commands::Ask {
            question,
            session,
            json,
        } => run_ask(cfg, &question, &session, json).await,
    }
}

#[derive(Parser)]
#[command(name = "ragbot")]
#[command(about = "Personal document chatbot: convert, ingest, serve", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert PDFs into cleaned text files
    Convert {
        /// Directory holding the PDFs (defaults to paths.pdfs)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory receiving the .txt files (defaults to paths.data)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Split, embed and store the converted text
    Ingest {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Run the question-answering API
    Serve {
        /// Port to listen on (defaults to api.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the web chat front end
    Web {
        /// Port to listen on (defaults to web.port)
        #[arg(long)]
        port: Option<u16>,
        /// Base URL of the API server (defaults to web.api_url)
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Ask a single question from the terminal
    Ask {
        question: String,
        /// Conversation to continue
        #[arg(long, default_value = "cli")]
        session: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

async fn run_convert(
    cfg: AppConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let input = input.unwrap_or_else(|| PathBuf::from(&cfg.paths.pdfs));
    let output = output.unwrap_or_else(|| PathBuf::from(&cfg.paths.data));
    let summary = converter::batch_convert(&input, &output, &cfg.convert).await?;
    if json {
        let summary_json = serde_json::json!({
            "status": "ok",
            "found": summary.found,
            "converted": summary.converted,
            "output": output.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&summary_json)?);
    } else {
        println!(
            "convert: {}/{} files converted into {}",
            summary.converted,
            summary.found,
            output.display()
        );
    }
    Ok(())
}

async fn run_ingest(cfg: AppConfig, json: bool) -> Result<()> {
    let registry = pipeline::build_registry(&cfg)?;
    let store = pipeline::build_vector_store(&cfg).await?;
    let summary = match ingest::run_ingest(&cfg, &registry, store.as_ref()).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Ingest failed: {}", e);
            tracing::error!("{:?}", e);
            return Err(e);
        }
    };
    if json {
        let summary_json = serde_json::json!({
            "status": "ok",
            "files": summary.files,
            "documents": summary.documents,
            "chunks": summary.chunks,
        });
        println!("{}", serde_json::to_string_pretty(&summary_json)?);
    } else {
        println!(
            "ingest: {} files, {} documents, {} chunks",
            summary.files, summary.documents, summary.chunks
        );
    }
    Ok(())
}

async fn run_serve(cfg: AppConfig, port: Option<u16>) -> Result<()> {
    tracing::info!("Embeddings directory: {}", cfg.paths.embeddings);
    let chain = match pipeline::load_chain(&cfg).await {
        Ok(chain) => {
            tracing::info!("Vector store loaded successfully");
            Some(Arc::new(chain))
        }
        Err(e) => {
            tracing::error!("Error loading vector store: {}", e);
            tracing::error!("{:?}", e);
            None
        }
    };
    let state = api::AppState {
        chain,
        feedback: Arc::new(FeedbackLog::new(&cfg.paths.feedback_log)),
    };

    let listener = bind_with_fallback(&cfg.api.host, port.unwrap_or(cfg.api.port)).await?;
    tracing::info!("API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, api::router(state)).await?;
    Ok(())
}

async fn run_web(cfg: AppConfig, port: Option<u16>, api_url: Option<String>) -> Result<()> {
    let api_url = api_url.unwrap_or(cfg.web.api_url);
    let listener = bind_with_fallback(&cfg.web.host, port.unwrap_or(cfg.web.port)).await?;
    tracing::info!(
        "Web front end on http://{} (API at {})",
        listener.local_addr()?,
        api_url
    );
    axum::serve(listener, web::router(web::WebState::new(&api_url))).await?;
    Ok(())
}

async fn run_ask(cfg: AppConfig, question: &str, session: &str, json: bool) -> Result<()> {
    let chain = pipeline::load_chain(&cfg).await?;
    let result = chain.ask(session, question).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.answer);
        if !result.sources.is_empty() {
            println!("\nsources: {}", result.sources.join(", "));
        }
    }
    Ok(())
}
