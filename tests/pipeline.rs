use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use doc_chat::application::services::Sampling;
use doc_chat::application::{
    ChatSession, DocumentService, EmbeddingFactory, RagService, SessionPipeline,
};
use doc_chat::domain::ports::{EmbeddingService, GenerationRequest, GenerationService};
use doc_chat::domain::{Document, DomainError, Embedding, TextSplitter};
use doc_chat::infrastructure::{Credentials, LoaderRegistry, PromptsConfig};

/// Hashed bag of words; shared vocabulary means high cosine similarity.
struct BagOfWords {
    calls: AtomicUsize,
}

impl BagOfWords {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn vector(text: &str) -> Embedding {
        let mut v = vec![0.0f32; 128];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(17usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % v.len();
            v[bucket] += 1.0;
        }
        Embedding::new(v)
    }
}

#[async_trait]
impl EmbeddingService for BagOfWords {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        128
    }
}

/// Answers with the first context line mentioning a word of the query,
/// or a greeting when there is no context.
#[derive(Default)]
struct ContextReader {
    requests: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl GenerationService for ContextReader {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        self.requests.lock().unwrap().push(request.clone());

        let words: Vec<String> = request
            .query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .map(str::to_lowercase)
            .collect();
        let hit = request
            .instruction
            .lines()
            .find(|line| words.iter().any(|w| line.to_lowercase().contains(w.as_str())));

        Ok(match hit {
            Some(line) => line.trim().to_string(),
            None => "Hello! How can I help you today?".to_string(),
        })
    }
}

struct Harness {
    session: ChatSession,
    embedding: Arc<BagOfWords>,
    generation: Arc<ContextReader>,
}

fn harness(credentials: Credentials) -> Harness {
    let embedding = Arc::new(BagOfWords::new());
    let generation = Arc::new(ContextReader::default());

    let shared = embedding.clone();
    let embeddings: EmbeddingFactory = Arc::new(
        move |_: &Credentials| -> Result<Arc<dyn EmbeddingService>, DomainError> {
            Ok(shared.clone())
        },
    );

    let pipeline = SessionPipeline {
        credentials: Arc::new(credentials),
        prompts: Arc::new(PromptsConfig::default()),
        documents: Arc::new(DocumentService::new(
            Arc::new(LoaderRegistry::new()),
            TextSplitter::default(),
        )),
        generation: generation.clone(),
        embeddings,
        sampling: Sampling {
            top_p: 0.95,
            top_k: 0,
        },
        default_temperature: 0.7,
        top_k: 5,
    };

    Harness {
        session: ChatSession::new(Arc::new(pipeline)),
        embedding,
        generation,
    }
}

fn credentials() -> Credentials {
    Credentials::from_pairs([
        ("API_KEY", "test-key"),
        ("PROJECT_ID", "test-project"),
        ("AGENT_MODEL_NAME", "gemini-1.5-flash"),
    ])
}

#[tokio::test]
async fn france_capital_is_answered_from_the_document() {
    let mut h = harness(credentials());
    let report = h
        .session
        .process_documents(vec![Document::new(
            "capital.txt",
            "The capital of France is Paris.",
        )])
        .await
        .unwrap();
    assert_eq!(report.processed, vec!["capital.txt"]);

    let reply = h
        .session
        .ask("What is the capital of France?", None)
        .await
        .unwrap();

    assert!(reply.answer.contains("Paris"), "answer: {}", reply.answer);
    assert_eq!(reply.sources, BTreeSet::from(["capital.txt".to_string()]));

    let requests = h.generation.requests.lock().unwrap();
    assert_eq!(requests[0].model, "gemini-1.5-flash");
}

#[tokio::test]
async fn hello_without_documents_has_no_sources() {
    let mut h = harness(credentials());
    let reply = h.session.ask("Hello", None).await.unwrap();

    assert!(!reply.answer.is_empty());
    assert!(reply.sources.is_empty());
    assert_eq!(h.embedding.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_api_key_fails_fast() {
    let mut h = harness(Credentials::from_pairs([("PROJECT_ID", "test-project")]));

    let reply = h.session.ask("Hello", None).await.unwrap();
    assert_eq!(reply.answer, "Error: API Key not found in credentials.yaml");
    assert!(reply.sources.is_empty());
    assert!(h.generation.requests.lock().unwrap().is_empty());

    let err = h
        .session
        .process_documents(vec![Document::new("capital.txt", "Paris")])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Configuration(_)));
    assert_eq!(h.embedding.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sources_come_from_uploaded_documents() {
    let mut h = harness(credentials());
    let uploads = vec![
        Document::new("france.md", "# France\n\nThe capital of France is Paris."),
        Document::new("italy.txt", "The capital of Italy is Rome."),
        Document::new("rivers.csv", "river,country\nSeine,France\nTiber,Italy\n"),
    ];
    let names: BTreeSet<String> = uploads.iter().map(|d| d.name.clone()).collect();
    h.session.process_documents(uploads).await.unwrap();

    let reply = h.session.ask("Which river flows through Italy?", None).await.unwrap();
    assert!(!reply.sources.is_empty());
    assert!(reply.sources.is_subset(&names));
}

#[tokio::test]
async fn history_is_passed_in_order_in_both_modes() {
    let mut h = harness(credentials());
    h.session.ask("first question", None).await.unwrap();
    h.session.ask("second question", None).await.unwrap();
    h.session.ask("third question", None).await.unwrap();

    h.session
        .process_documents(vec![Document::new("notes.txt", "Some third question notes.")])
        .await
        .unwrap();
    h.session.clear_chat();
    h.session.ask("first question", None).await.unwrap();
    h.session.ask("second question", None).await.unwrap();
    h.session.ask("third question", None).await.unwrap();

    let requests = h.generation.requests.lock().unwrap();
    for request in [&requests[2], &requests[5]] {
        let users: Vec<&str> = request.history.iter().map(|t| t.user.as_str()).collect();
        assert_eq!(users, vec!["first question", "second question"]);
        assert_eq!(request.query, "third question");
    }
    assert!(requests[5].instruction.contains("Some third question notes."));
}

#[tokio::test]
async fn every_chunk_is_retrievable_by_its_own_text() {
    let documents = DocumentService::new(
        Arc::new(LoaderRegistry::new()),
        TextSplitter::new(120, 20).unwrap(),
    );
    let text = "Rust is a systems programming language.\n\n\
                Tokio is an asynchronous runtime for Rust.\n\n\
                Axum is a web framework built on Tokio and Tower.\n\n\
                Serde serializes and deserializes Rust data structures.\n\n\
                Tracing records structured diagnostic events.";
    let (chunks, _) = documents
        .ingest(&[Document::new("crates.txt", text)])
        .unwrap();
    assert!(chunks.len() > 1);

    let rag = RagService::index(Arc::new(BagOfWords::new()), chunks.clone(), 3)
        .await
        .unwrap();
    for chunk in &chunks {
        let results = rag.retrieve(&chunk.content).await.unwrap();
        assert!(
            results.iter().any(|r| r.chunk.id == chunk.id),
            "chunk {} not retrieved",
            chunk.chunk_index
        );
    }
}
