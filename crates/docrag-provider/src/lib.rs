pub mod embed;
pub mod generate;
pub mod http;
pub mod retry;

use std::sync::Arc;
use tracing::info;

use docrag_core::config::{Provider, Settings};
use docrag_core::error::Result;
use docrag_core::traits::{Embedder, Generator};

use crate::embed::{HashEmbedder, OpenAiEmbedder, VertexEmbedder};
use crate::generate::{OpenAiGenerator, VertexGenerator};

/// Select the embedding backend once, from configuration.
pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    if settings.use_fake_embeddings {
        info!("using offline hashing embedder");
        return Ok(Arc::new(HashEmbedder::default()));
    }
    let embedder: Arc<dyn Embedder> = match settings.provider {
        Provider::Local => Arc::new(OpenAiEmbedder::new(&settings.local, &settings.http, settings.embedding_batch_size)?),
        Provider::Managed => {
            Arc::new(VertexEmbedder::new(&settings.managed, &settings.http, settings.embedding_batch_size)?)
        }
    };
    info!(embedder = embedder.embedder_id(), "embedder ready");
    Ok(embedder)
}

pub fn build_generator(settings: &Settings) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match settings.provider {
        Provider::Local => Arc::new(OpenAiGenerator::new(&settings.local, &settings.http)?),
        Provider::Managed => Arc::new(VertexGenerator::new(&settings.managed, &settings.http)?),
    };
    info!(generator = generator.name(), "generator ready");
    Ok(generator)
}
