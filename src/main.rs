use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use checklist_rag::answer::HttpChatClient;
use checklist_rag::config::{self, get_config};
use checklist_rag::embedding::HttpEmbeddingClient;
use checklist_rag::index::SearchIndexService;
use checklist_rag::logging;
use checklist_rag::pipeline::{ChecklistService, PipelineSettings};
use checklist_rag::storage::FsBlobStore;

#[derive(Parser)]
#[command(
    name = "checklist-rag",
    about = "Ingest extracted documents and answer checklists against them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream, chunk, embed, and index an extracted document.
    Ingest {
        /// Run identifier; the artifact is read from `{request_id}.json`.
        #[arg(long)]
        request_id: String,
    },
    /// Answer a checklist against previously ingested documents.
    Answer {
        /// Run identifier used to scope retrieval.
        #[arg(long)]
        request_id: String,
        /// Blob path of the checklist document.
        #[arg(long)]
        checklist: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_config();
    logging::init_tracing();
    let cli = Cli::parse();

    let service = build_service().context("Failed to assemble pipeline service")?;
    match cli.command {
        Command::Ingest { request_id } => {
            let outcome = service.ingest_document(&request_id).await?;
            tracing::info!(
                request_id,
                entries = outcome.entries,
                chunks = outcome.chunks,
                indexed = outcome.indexed,
                failed = outcome.failed,
                "Ingestion finished"
            );
            println!(
                "Ingested {} entries into {} chunks ({} indexed, {} failed)",
                outcome.entries, outcome.chunks, outcome.indexed, outcome.failed
            );
        }
        Command::Answer {
            request_id,
            checklist,
        } => {
            let outcome = service.answer_checklist(&request_id, &checklist).await?;
            println!(
                "Answered {} of {} leaves ({} failed); artifact at {}",
                outcome.processed, outcome.leaves, outcome.failed, outcome.artifact_path
            );
        }
    }
    Ok(())
}

fn build_service() -> Result<ChecklistService> {
    let config = get_config();
    let blob_store = Arc::new(FsBlobStore::new(config.blob_root.clone()));
    let embedding = Arc::new(HttpEmbeddingClient::new(
        &config.embedding_url,
        config.embedding_api_key.clone(),
        &config.embedding_model,
    )?);
    let index = Arc::new(SearchIndexService::new(
        &config.search_url,
        config.search_api_key.clone(),
        &config.search_collection_name,
        config.embedding_dimension as u64,
    )?);
    let chat = Arc::new(HttpChatClient::new(
        &config.chat_url,
        config.chat_api_key.clone(),
        &config.chat_model,
    )?);

    Ok(ChecklistService::new(
        blob_store,
        embedding,
        index,
        chat,
        PipelineSettings::from_config(config),
    ))
}
