// crates/counsel-server/src/cli.rs
// CLI argument surface and command runners

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use counsel::adapters::build_adapters;
use counsel::config::CounselConfig;
use counsel::deliberation::DeliberationEngine;
use counsel::graph::{
    DecisionRetriever, GraphIntegration, GraphStore, QueryEngine, SimilarityCache,
    SimilarityWorker,
};
use counsel::mcp::CounselServer;
use counsel::similarity::SimilarityDetector;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Queue bound for the background similarity worker.
const WORKER_QUEUE_SIZE: usize = 1000;
/// Recent-decision window compared per similarity job.
const WORKER_BATCH_SIZE: usize = 50;
/// Minimum score stored as an edge.
const WORKER_THRESHOLD: f64 = 0.5;

#[derive(Parser)]
#[command(name = "counsel", version, about = "Multi-model deliberation server with decision graph memory")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config.yaml (defaults to ./config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Inspect the decision graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },
}

#[derive(Subcommand)]
pub enum GraphAction {
    /// List recent decisions (newest first)
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show one decision with its stances
    Show { decision_id: String },
    /// Find decisions similar to a query
    Similar {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

fn load_config(path: Option<&Path>) -> Result<CounselConfig> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    if path.exists() {
        Ok(CounselConfig::load(&path)?)
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        let mut config = CounselConfig::default();
        config.resolve(Path::new("."))?;
        Ok(config)
    }
}

struct GraphComponents {
    integration: Arc<GraphIntegration>,
    query: Arc<QueryEngine>,
    worker: Arc<SimilarityWorker>,
}

async fn build_graph(config: &CounselConfig) -> Result<GraphComponents> {
    // One cache shared across the stack: the retriever's query results
    // live in L1, the detector's embeddings in the permanent L2 tier.
    let cache = Arc::new(SimilarityCache::new(
        config.decision_graph.query_cache_size,
        config.decision_graph.embedding_cache_size,
        Duration::from_secs(config.decision_graph.query_ttl_secs),
    ));
    let detector = Arc::new(SimilarityDetector::with_embedding_cache(
        config.embeddings.as_ref(),
        cache.clone(),
    ));

    let store = Arc::new(GraphStore::open(Path::new(&config.decision_graph.db_path)).await?);
    let retriever = Arc::new(DecisionRetriever::with_shared_cache(
        store.clone(),
        detector.clone(),
        cache,
        config.decision_graph.clone(),
    ));
    let worker = Arc::new(SimilarityWorker::new(
        store.clone(),
        detector.clone(),
        WORKER_QUEUE_SIZE,
        WORKER_BATCH_SIZE,
        WORKER_THRESHOLD,
    ));
    worker.start().await;

    let integration = Arc::new(GraphIntegration::new(
        store.clone(),
        retriever,
        detector.clone(),
        Some(worker.clone()),
        config.decision_graph.clone(),
    ));
    let query = Arc::new(QueryEngine::new(
        store,
        detector,
        config.decision_graph.noise_floor,
    ));
    Ok(GraphComponents {
        integration,
        query,
        worker,
    })
}

/// Run the MCP server on stdio until the client disconnects.
pub async fn run_mcp_server(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let adapters = build_adapters(&config.adapters)?;
    info!(adapters = adapters.len(), "Adapters registered");

    let graph = if config.decision_graph.enabled {
        Some(build_graph(&config).await?)
    } else {
        info!("Decision graph disabled");
        None
    };

    let engine = Arc::new(DeliberationEngine::new(
        adapters,
        config,
        graph.as_ref().map(|g| g.integration.clone()),
    ));
    let server = CounselServer::new(engine, graph.as_ref().map(|g| g.query.clone()));

    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;
    service.waiting().await?;

    if let Some(graph) = graph {
        graph.worker.stop(Duration::from_secs(30)).await;
    }
    Ok(())
}

/// Run a graph inspection subcommand.
pub async fn run_graph(config_path: Option<&Path>, action: GraphAction) -> Result<()> {
    let config = load_config(config_path)?;
    let store = Arc::new(
        GraphStore::open(Path::new(&config.decision_graph.db_path))
            .await
            .context("opening decision graph store")?,
    );
    let detector = Arc::new(SimilarityDetector::new(config.embeddings.as_ref()));

    match action {
        GraphAction::List { limit } => {
            let decisions = store.list_decisions(limit, 0).await?;
            if decisions.is_empty() {
                println!("No decisions recorded yet.");
                return Ok(());
            }
            for d in decisions {
                println!(
                    "{}  {}  [{}]  {}",
                    d.timestamp.format("%Y-%m-%d %H:%M"),
                    d.id,
                    d.convergence_status,
                    d.question
                );
            }
        }
        GraphAction::Show { decision_id } => {
            let query = QueryEngine::new(store, detector, config.decision_graph.noise_floor);
            match query.get_decision_detail(&decision_id).await? {
                Some(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
                None => println!("Decision '{decision_id}' not found."),
            }
        }
        GraphAction::Similar { query: text, limit } => {
            let query = QueryEngine::new(store, detector, config.decision_graph.noise_floor);
            let results = query.search_similar(&text, limit, None).await?;
            if results.is_empty() {
                println!("No similar decisions found.");
                return Ok(());
            }
            for r in results {
                println!("{:.2}  {}  {}", r.score, r.decision.id, r.decision.question);
            }
        }
    }
    Ok(())
}
