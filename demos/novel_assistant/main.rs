//! # Novel Assistant Example
//!
//! Ingests three volumes of a short series, then asks questions as a reader
//! who is part-way through volume 3. Only volumes 1 and 2 are ever used as
//! context, and the resulting system prompt is printed.
//!
//! Uses `InMemoryVectorStore` with a deterministic `MockEmbeddingProvider`, so
//! it runs with **zero API keys**. When `GOOGLE_API_KEY` (or
//! `GOOGLE_GENERATIVE_AI_API_KEY`) is set, Gemini embeddings are used instead.
//!
//! Run: `RUST_LOG=novel_rag=debug cargo run --example novel_assistant`

use std::sync::Arc;

use novel_rag::{
    EmbeddingProvider, GeminiEmbeddingProvider, InMemoryVectorStore, RagConfig, VolumeRetriever,
    VolumeUpload, novel_system_prompt,
};
use novel_rag_demos::MockEmbeddingProvider;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VOLUMES: [(&str, &str); 3] = [
    (
        "the-lamp-1.txt",
        "Mara is the keeper of the Greywater lighthouse. Every night she climbs the tower \
         and lights the great lamp. Her brother Tobin fishes the cold northern bay. \
         A stranger named Ilse washes ashore after a storm and Mara takes her in.",
    ),
    (
        "the-lamp-2.txt",
        "Ilse reveals she is a cartographer from the southern kingdom. She draws a map of \
         the reefs around Greywater. Tobin distrusts her and follows her to the old \
         chapel, where she meets a man in a grey coat.",
    ),
    (
        "the-lamp-3.txt",
        "The man in the grey coat is the exiled prince. Ilse betrays Mara and the lamp is \
         put out, and the prince's fleet sails through the reefs. Tobin dies defending \
         the tower.",
    ),
];

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // -- 1. Pick an embedding provider ------------------------------------
    let embedder: Arc<dyn EmbeddingProvider> = match GeminiEmbeddingProvider::from_env() {
        Ok(gemini) => {
            info!("using Gemini embeddings");
            Arc::new(gemini)
        }
        Err(e) => {
            warn!(reason = %e, "falling back to mock embeddings");
            Arc::new(MockEmbeddingProvider::new(64))
        }
    };

    // -- 2. Build the retriever -------------------------------------------
    // Small chunks so each volume produces several of them.
    let config = RagConfig::builder().chunk_size(120).chunk_overlap(30).top_k(3).build()?;
    let store = Arc::new(InMemoryVectorStore::new(embedder));
    let retriever = VolumeRetriever::new(store).with_config(config)?;

    // -- 3. Ingest the series ---------------------------------------------
    for (i, (filename, text)) in VOLUMES.iter().enumerate() {
        let upload =
            VolumeUpload::new(i as u32 + 1, *filename, *text).with_series_name("The Lamp");
        let info = retriever.ingest_volume(&upload).await?;
        println!(
            "Volume {} ({}) → {} chunk(s)",
            info.volume_number, info.filename, info.chunk_count
        );
    }
    println!("Indexed volumes: {:?}", retriever.list_indexed_volumes().await?);

    // -- 4. Ask as a reader on volume 3 -----------------------------------
    let current_volume = 3;
    for query in ["Who is Ilse?", "What happens to Tobin?"] {
        println!("\nQuery (reading volume {current_volume}): \"{query}\"");
        let results = retriever.search_before_volume(query, current_volume, 3).await?;
        if results.is_empty() {
            println!("  (no results)");
        }
        for (i, result) in results.iter().enumerate() {
            let preview: String = result.document.content.chars().take(80).collect();
            println!(
                "  {}. [score={:.4}] volume={} | {}",
                i + 1,
                result.score,
                result.document.volume_number().unwrap_or_default(),
                preview,
            );
        }
    }

    // -- 5. Assemble the system prompt ------------------------------------
    let context = retriever.context_before_volume("Who is the man in the grey coat?", 3).await?;
    println!("\n{}", novel_system_prompt(current_volume, &context));

    Ok(())
}
