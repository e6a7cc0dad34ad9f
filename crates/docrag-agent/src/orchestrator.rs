//! Chooses a retriever, builds the local index on demand, and answers questions.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use docrag_core::chunker::Chunker;
use docrag_core::config::Settings;
use docrag_core::error::{Error, Result};
use docrag_core::loader::Loader;
use docrag_core::traits::{Embedder, Generator, Retriever};
use docrag_core::types::{RetrievalResult, SearchMode};
use docrag_remote::RemoteRetriever;
use docrag_vector::index::VectorIndex;
use docrag_vector::retriever::LocalRetriever;

use crate::prompt::{build_prompt, error_answer, format_context, EMPTY_CORPUS_RESPONSE};

/// What `initialize` (or `rebuild`) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Remote search selected; nothing local was touched.
    Remote,
    /// Reused the index at the persist location.
    Loaded { chunks: usize },
    /// Loaded, chunked and embedded the data directory.
    Built { documents: usize, chunks: usize },
    /// No documents and no remote search; still uninitialized.
    Empty,
    AlreadyIndexed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Uninitialized,
    Remote,
    Local { chunks: usize, embedder_id: String, persist_location: PathBuf },
}

enum State {
    Uninitialized,
    Remote(Arc<RemoteRetriever>),
    Local(Arc<LocalRetriever>),
}

impl State {
    fn retriever(&self) -> Option<Arc<dyn Retriever>> {
        match self {
            State::Uninitialized => None,
            State::Remote(r) => Some(r.clone()),
            State::Local(r) => Some(r.clone()),
        }
    }
}

/// One per process or session; share it behind an `Arc`.
///
/// Initialization happens at most once: it runs under the state lock, so
/// racing callers wait for the first one and then see the indexed state.
pub struct RetrievalOrchestrator {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    state: Mutex<State>,
}

impl RetrievalOrchestrator {
    /// Build embedder and generator from configuration.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let embedder = docrag_provider::build_embedder(&settings)?;
        let generator = docrag_provider::build_generator(&settings)?;
        Self::new(settings, embedder, generator)
    }

    pub fn new(settings: Settings, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, embedder, generator, state: Mutex::new(State::Uninitialized) })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn initialize(&self) -> Result<InitOutcome> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await
    }

    async fn initialize_locked(&self, state: &mut State) -> Result<InitOutcome> {
        if !matches!(state, State::Uninitialized) {
            return Ok(InitOutcome::AlreadyIndexed);
        }

        if self.settings.remote_search.is_enabled() {
            match RemoteRetriever::new(&self.settings.remote_search, &self.settings.http) {
                Ok(remote) => {
                    info!("using remote search");
                    *state = State::Remote(Arc::new(remote));
                    return Ok(InitOutcome::Remote);
                }
                Err(e) => warn!(error = %e, "remote search is configured but unusable, falling back to the local index"),
            }
        }

        let persist = self.settings.persist_path();
        match VectorIndex::load(&persist).await {
            Ok(index) => {
                let chunks = index.len();
                let retriever = LocalRetriever::new(index, self.embedder.clone(), self.settings.search_mode())?;
                *state = State::Local(Arc::new(retriever));
                return Ok(InitOutcome::Loaded { chunks });
            }
            Err(Error::IndexNotFound(_)) => info!(location = %persist.display(), "no index yet, building one"),
            Err(e) => return Err(e),
        }

        let (outcome, retriever) = self.build_local().await?;
        if let Some(retriever) = retriever {
            *state = State::Local(retriever);
        }
        Ok(outcome)
    }

    /// Loader → Chunker → Embedder → VectorIndex over the data directory.
    async fn build_local(&self) -> Result<(InitOutcome, Option<Arc<LocalRetriever>>)> {
        let chunker = Chunker::new(self.settings.chunk_size, self.settings.chunk_overlap)?;
        let data_dir = self.settings.data_path();
        let documents = Loader::new().load_directory(&data_dir);
        if documents.is_empty() {
            warn!(dir = %data_dir.display(), "no documents to index");
            return Ok((InitOutcome::Empty, None));
        }
        let chunks = chunker.split_documents(&documents);
        let index = VectorIndex::build(&chunks, self.embedder.as_ref(), &self.settings.persist_path()).await?;
        let retriever = LocalRetriever::new(index, self.embedder.clone(), self.settings.search_mode())?;
        info!(documents = documents.len(), chunks = chunks.len(), "index built");
        Ok((InitOutcome::Built { documents: documents.len(), chunks: chunks.len() }, Some(Arc::new(retriever))))
    }

    /// Discard the local index and rebuild it from the data directory.
    ///
    /// An active remote retriever stays selected.
    pub async fn rebuild(&self) -> Result<InitOutcome> {
        let mut state = self.state.lock().await;
        let (outcome, retriever) = self.build_local().await?;
        let remote_active = matches!(*state, State::Remote(_));
        match retriever {
            _ if remote_active => info!("local index rebuilt; remote search remains active"),
            Some(local) => *state = State::Local(local),
            None => {
                VectorIndex::clear(&self.settings.persist_path())?;
                *state = State::Uninitialized;
            }
        }
        Ok(outcome)
    }

    pub async fn status(&self) -> Status {
        match &*self.state.lock().await {
            State::Uninitialized => Status::Uninitialized,
            State::Remote(_) => Status::Remote,
            State::Local(r) => Status::Local {
                chunks: r.index().len(),
                embedder_id: r.index().embedder_id().to_string(),
                persist_location: r.index().persist_location().to_path_buf(),
            },
        }
    }

    /// The active retriever, initializing first if needed. `None` means empty corpus.
    async fn active_retriever(&self) -> Result<Option<Arc<dyn Retriever>>> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Uninitialized) {
            self.initialize_locked(&mut state).await?;
        }
        Ok(state.retriever())
    }

    /// Raw ranked hits for `question` with the configured k and ranking.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        self.retrieve_with(question, self.settings.top_k, self.settings.search_mode()).await
    }

    pub async fn retrieve_with(&self, question: &str, k: usize, mode: SearchMode) -> Result<RetrievalResult> {
        match self.active_retriever().await? {
            Some(retriever) => retriever.retrieve_ranked(question, k, mode).await,
            None => Ok(RetrievalResult::default()),
        }
    }

    pub async fn query(&self, question: &str) -> Result<String> {
        self.query_with(question, self.settings.top_k, self.settings.search_mode()).await
    }

    /// Answer with an explicit k and ranking mode.
    ///
    /// Only initialization failures are returned as `Err`; retrieval and
    /// generation failures become an answer starting with `Error:`.
    pub async fn query_with(&self, question: &str, k: usize, mode: SearchMode) -> Result<String> {
        let Some(retriever) = self.active_retriever().await? else {
            return Ok(EMPTY_CORPUS_RESPONSE.to_string());
        };

        let result = match retriever.retrieve_ranked(question, k, mode).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, retriever = retriever.name(), "retrieval failed");
                return Ok(error_answer(&e));
            }
        };
        let prompt = build_prompt(&format_context(&result), question);
        match self.generator.generate(&prompt).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(error = %e, generator = self.generator.name(), "generation failed");
                Ok(error_answer(&e))
            }
        }
    }
}
