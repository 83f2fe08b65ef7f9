//! Ingestion orchestrator (§4.O): wires the watcher, debounce window,
//! content-address decision, chunker, and adaptive embedding stage into a
//! single pipeline that periodically flushes batched points through the
//! storage coordinator.

use atlas_core::backend::{MetadataBackend, NamedVectors, Point};
use atlas_core::chunk::{chunk_text, RawChunk};
use atlas_core::model::{ChunkPayload, ContentType, VectorName};
use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::adaptive::{adaptive_parallel, AdaptiveParams};
use crate::coordinator::StorageCoordinator;
use crate::embedding::EmbedderRegistry;
use crate::pressure::PressureProbe;
use crate::tracker::{self, IngestDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawEventKind {
    Changed,
    Removed,
}

#[derive(Debug, Clone)]
struct RawEvent {
    path: PathBuf,
    kind: RawEventKind,
}

pub struct OrchestratorConfig {
    pub collection: String,
    pub max_chunk_chars: usize,
    pub debounce_ms: u64,
    pub flush_interval_ms: u64,
    pub flush_batch_size: usize,
    pub adaptive: AdaptiveParams,
}

/// Drives A-N per source file event: watch → debounce → decide → chunk →
/// adaptive embed → periodic flush.
pub struct Orchestrator {
    coordinator: Arc<StorageCoordinator>,
    /// Held directly (alongside the coordinator) so the §4.F decision can
    /// read prior source/chunk state without going through the read-through
    /// cache — this is an internal planning read, not the documented
    /// `get_chunk_by_id` read path.
    metadata: Arc<dyn MetadataBackend>,
    embedder: Arc<EmbedderRegistry>,
    probe: Arc<dyn PressureProbe>,
    config: OrchestratorConfig,
    buffer: Mutex<Vec<Point>>,
    watcher_handle: Mutex<Option<RecommendedWatcher>>,
}

impl Orchestrator {
    pub fn new(
        coordinator: Arc<StorageCoordinator>,
        metadata: Arc<dyn MetadataBackend>,
        embedder: Arc<EmbedderRegistry>,
        probe: Arc<dyn PressureProbe>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            metadata,
            embedder,
            probe,
            config,
            buffer: Mutex::new(Vec::new()),
            watcher_handle: Mutex::new(None),
        })
    }

    /// Starts watching `root` (recursively) and spawns the debounce,
    /// ingest, and periodic-flush tasks. Returns immediately; the pipeline
    /// runs in the background for the lifetime of the returned handles.
    pub async fn watch(self: &Arc<Self>, root: &Path) -> anyhow::Result<()> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawEvent>();

        let watcher_tx = raw_tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(raw) = classify_event(&event) {
                        let _ = watcher_tx.send(raw);
                    }
                }
                Err(e) => error!("file watcher error: {e}"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        *self.watcher_handle.lock().await = Some(watcher);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.debounce_and_ingest(raw_rx).await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.flush_loop().await });

        Ok(())
    }

    /// Coalesces events per path over `debounce_ms`, then runs each settled
    /// path through the decide→chunk→embed stage via `adaptive_parallel`.
    async fn debounce_and_ingest(self: Arc<Self>, mut raw_rx: mpsc::UnboundedReceiver<RawEvent>) {
        let mut pending: HashMap<PathBuf, (RawEventKind, tokio::time::Instant)> = HashMap::new();
        let debounce = Duration::from_millis(self.config.debounce_ms.max(10));
        let mut scan = tokio::time::interval(debounce / 2 + Duration::from_millis(1));

        loop {
            tokio::select! {
                maybe_event = raw_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            pending.insert(event.path, (event.kind, tokio::time::Instant::now()));
                        }
                        None => break,
                    }
                }
                _ = scan.tick() => {
                    let now = tokio::time::Instant::now();
                    let settled: Vec<(PathBuf, RawEventKind)> = pending
                        .iter()
                        .filter(|(_, (_, seen))| now.duration_since(*seen) >= debounce)
                        .map(|(path, (kind, _))| (path.clone(), *kind))
                        .collect();
                    for (path, _) in &settled {
                        pending.remove(path);
                    }
                    if !settled.is_empty() {
                        self.process_settled(settled).await;
                    }
                }
            }
        }
    }

    async fn process_settled(self: &Arc<Self>, events: Vec<(PathBuf, RawEventKind)>) {
        use futures::StreamExt;

        let source = futures::stream::iter(events);
        let this = Arc::clone(self);
        let per_path_points: Vec<Vec<Point>> = adaptive_parallel(
            source,
            move |(path, kind)| {
                let this = Arc::clone(&this);
                async move { this.ingest_one(&path, kind).await }
            },
            self.config.adaptive,
            Arc::clone(&self.probe),
        )
        .collect()
        .await;
        let points: Vec<Point> = per_path_points.into_iter().flatten().collect();

        if !points.is_empty() {
            let mut buffer = self.buffer.lock().await;
            buffer.extend(points);
            if buffer.len() >= self.config.flush_batch_size {
                let batch = std::mem::take(&mut *buffer);
                drop(buffer);
                self.flush(batch).await;
            }
        }
    }

    /// §4.F decision → §4.D chunk → §4.E embed for a single settled path.
    /// Returns the points to buffer, or an empty vec on a deletion event or
    /// an unreadable/unchanged file.
    async fn ingest_one(&self, path: &Path, kind: RawEventKind) -> Vec<Point> {
        if kind == RawEventKind::Removed {
            self.handle_removal(path).await;
            return Vec::new();
        }

        let canonical_path = match tracker::canonicalize_path(path) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping unreadable path {}: {e}", path.display());
                return Vec::new();
            }
        };

        let content = match tokio::fs::read_to_string(&canonical_path).await {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to read {canonical_path}: {e}");
                return Vec::new();
            }
        };

        let content_type = content_type_for_path(&canonical_path);
        let raw_chunks = chunk_text(&content, self.config.max_chunk_chars, content_type);

        let source_id = tracker::source_id_for_path(&canonical_path);
        let previous_source = match self.metadata.get_source_by_path(&canonical_path).await {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to look up previous source for {canonical_path}: {e}");
                None
            }
        };
        let previous_chunks = match self.metadata.get_chunks_by_source(&source_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to look up previous chunks for {canonical_path}: {e}");
                Vec::new()
            }
        };
        let previous_chunk_texts: Vec<(i64, String)> = previous_chunks
            .iter()
            .map(|c| (c.chunk_index, c.payload.original_text.clone()))
            .collect();
        let new_chunk_texts: Vec<(i64, String)> =
            raw_chunks.iter().map(|c| (c.chunk_index, c.text.clone())).collect();

        let new_content_hash = tracker::content_hash_for_chunks(raw_chunks.iter().map(|c| c.text.as_str()));
        let new_file_mtime = std::fs::metadata(&canonical_path)
            .and_then(|m| m.modified())
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let decision = tracker::decide(
            previous_source.as_ref(),
            &new_content_hash,
            new_file_mtime,
            &previous_chunk_texts,
            &new_chunk_texts,
        );

        let chunks_to_embed: Vec<&RawChunk> = match &decision {
            IngestDecision::NoOp => {
                info!("no change for {canonical_path}, skipping");
                return Vec::new();
            }
            IngestDecision::IngestAll => raw_chunks.iter().collect(),
            IngestDecision::Reingest { new_chunk_indices, .. } => {
                let wanted: BTreeSet<i64> = new_chunk_indices.iter().copied().collect();
                raw_chunks.iter().filter(|c| wanted.contains(&c.chunk_index)).collect()
            }
        };

        if chunks_to_embed.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = chunks_to_embed.iter().map(|c| c.text.clone()).collect();
        let batch = match self.embedder.embed_batch(&texts, content_type).await {
            Ok(b) => b,
            Err(e) => {
                warn!("embedding failed for {canonical_path}: {e}");
                return Vec::new();
            }
        };

        let file_name = Path::new(&canonical_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = Path::new(&canonical_path)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let vector_name = vector_name_for(content_type);
        let now = Utc::now();

        chunks_to_embed
            .into_iter()
            .zip(batch.embeddings.into_iter())
            .map(|(raw, embedding)| {
                let payload = ChunkPayload {
                    original_text: raw.text.clone(),
                    file_path: canonical_path.clone(),
                    file_name: file_name.clone(),
                    file_type: file_type.clone(),
                    chunk_index: raw.chunk_index,
                    total_chunks: raw.total_chunks,
                    char_count: raw.char_count,
                    qntm_keys: raw.qntm_keys.clone(),
                    created_at: now,
                    embedding_model: batch.model.clone(),
                    embedding_strategy: atlas_core::model::EmbeddingStrategy::Snippet,
                    content_type,
                    vectors_present: BTreeSet::from([vector_name]),
                    consolidation_level: None,
                    importance: None,
                };
                let mut vectors: NamedVectors = NamedVectors::new();
                vectors.insert(vector_name.as_str().to_string(), embedding);
                Point {
                    id: format!("{source_id}:{}", raw.chunk_index),
                    vectors,
                    payload: serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null),
                }
            })
            .collect()
    }

    /// A deletion event marks the source row `Deleted` (§4.F); per-chunk
    /// `deletion_eligible` flips lazily the next time this path is
    /// successfully reingested, rather than synchronously here (§4.O.5: "no
    /// synchronous unindexing").
    async fn handle_removal(&self, path: &Path) {
        let canonical_path = path.to_string_lossy().into_owned();
        match self.metadata.get_source_by_path(&canonical_path).await {
            Ok(Some(mut source)) => {
                source.status = atlas_core::model::SourceStatus::Deleted;
                source.updated_at = Utc::now();
                if let Err(e) = self.metadata.upsert_source(&source).await {
                    warn!("failed to mark source {} deleted: {e}", source.source_id);
                } else {
                    info!("marked source {} deleted (path removed: {canonical_path})", source.source_id);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("failed to look up source for removed path {canonical_path}: {e}"),
        }
    }

    async fn flush_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.flush_interval_ms.max(10)));
        loop {
            ticker.tick().await;
            let batch = {
                let mut buffer = self.buffer.lock().await;
                if buffer.is_empty() {
                    continue;
                }
                std::mem::take(&mut *buffer)
            };
            self.flush(batch).await;
        }
    }

    async fn flush(&self, batch: Vec<Point>) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len();
        if let Err(e) = self.coordinator.upsert_vectors(&self.config.collection, batch).await {
            error!("flush of {n} points failed: {e}");
        } else {
            info!("flushed {n} points");
        }
    }
}

fn classify_event(event: &Event) -> Option<RawEvent> {
    let path = event.paths.first()?.clone();
    match event.kind {
        EventKind::Remove(_) => Some(RawEvent {
            path,
            kind: RawEventKind::Removed,
        }),
        EventKind::Create(_) | EventKind::Modify(_) => Some(RawEvent {
            path,
            kind: RawEventKind::Changed,
        }),
        _ => None,
    }
}

fn content_type_for_path(path: &str) -> ContentType {
    const CODE_EXTENSIONS: &[&str] = &[
        "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "cc", "cpp", "h", "hpp", "rb",
        "php", "cs", "swift", "kt", "scala", "sh",
    ];
    const MEDIA_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "mp3", "mp4", "wav", "pdf"];

    let ext = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if CODE_EXTENSIONS.contains(&ext.as_str()) {
        ContentType::Code
    } else if MEDIA_EXTENSIONS.contains(&ext.as_str()) {
        ContentType::Media
    } else {
        ContentType::Text
    }
}

fn vector_name_for(content_type: ContentType) -> VectorName {
    match content_type {
        ContentType::Code => VectorName::Code,
        ContentType::Media => VectorName::Media,
        ContentType::Text => VectorName::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_dispatches_on_extension() {
        assert_eq!(content_type_for_path("src/main.rs"), ContentType::Code);
        assert_eq!(content_type_for_path("notes/todo.md"), ContentType::Text);
        assert_eq!(content_type_for_path("photos/cat.png"), ContentType::Media);
        assert_eq!(content_type_for_path("no_extension"), ContentType::Text);
    }

    #[test]
    fn vector_name_matches_content_type() {
        assert_eq!(vector_name_for(ContentType::Code), VectorName::Code);
        assert_eq!(vector_name_for(ContentType::Media), VectorName::Media);
        assert_eq!(vector_name_for(ContentType::Text), VectorName::Text);
    }

    #[test]
    fn classify_event_maps_remove_to_removed_and_create_modify_to_changed() {
        let remove = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("a.md"));
        assert_eq!(classify_event(&remove).unwrap().kind, RawEventKind::Removed);

        let create = Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("a.md"));
        assert_eq!(classify_event(&create).unwrap().kind, RawEventKind::Changed);

        let other = Event::new(EventKind::Access(notify::event::AccessKind::Open(
            notify::event::AccessMode::Any,
        )))
        .add_path(PathBuf::from("a.md"));
        assert!(classify_event(&other).is_none());
    }

    #[test]
    fn classify_event_ignores_events_with_no_path() {
        let event = Event::new(EventKind::Create(notify::event::CreateKind::File));
        assert!(classify_event(&event).is_none());
    }
}
