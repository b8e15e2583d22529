//! In-memory vector index over catalogue embeddings
//!
//! Unit vectors, inner-product similarity (equal to cosine). A flat scan
//! serves small catalogues; past 100k items the index switches to an
//! inverted-file layout (coarse centroids + per-cluster posting lists) with
//! the same search contract. The payload array is always parallel to the
//! vector array.
//!
//! Mutations (add, replace, persist, optimize) take the writer lock;
//! searches share the reader lock against a consistent snapshot.

use dashmap::DashMap;
use mood_gateway_catalog::{parse_detail, MetadataClient};
use mood_gateway_core::{CatalogueItem, ContentType, GatewayError};
use parking_lot::RwLock;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::encoder::{Embedder, EMBEDDING_DIM};

/// Items below this rating are never ingested or surfaced.
pub const MIN_VOTE_AVERAGE: f32 = 6.0;

/// Item count beyond which the flat scan switches to the IVF layout.
const IVF_THRESHOLD: usize = 100_000;

/// K-means refinement iterations when building the IVF layout.
const KMEANS_ITERATIONS: usize = 10;

/// On-disk file names under `INDEX_DIR`.
const INDEX_FILE: &str = "faiss_index.bin";
const PAYLOAD_FILE: &str = "embeddings_cache.pkl";

/// One search hit.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: CatalogueItem,
    /// Inner product with the query, in [-1, 1] for unit vectors.
    pub score: f32,
}

/// Index size and layout summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total: usize,
    pub movies: usize,
    pub tv: usize,
    pub optimized: bool,
}

struct IvfBackend {
    nprobe: usize,
    /// nlist x dim, unit-normalized
    centroids: Vec<f32>,
    /// Posting lists of row indices per centroid
    lists: Vec<Vec<u32>>,
    /// Row index -> centroid, parallel to the vector rows
    assignments: Vec<u32>,
}

enum Backend {
    Flat,
    Ivf(IvfBackend),
}

struct IndexState {
    /// Row-major N x dim
    vectors: Vec<f32>,
    payloads: Vec<CatalogueItem>,
    keys: HashMap<(ContentType, i64), usize>,
    backend: Backend,
}

impl IndexState {
    fn empty() -> Self {
        Self {
            vectors: Vec::new(),
            payloads: Vec::new(),
            keys: HashMap::new(),
            backend: Backend::Flat,
        }
    }

    fn len(&self) -> usize {
        self.payloads.len()
    }

    fn row(&self, idx: usize, dim: usize) -> &[f32] {
        &self.vectors[idx * dim..(idx + 1) * dim]
    }
}

#[derive(Serialize, Deserialize)]
enum PersistedBackend {
    Flat,
    Ivf {
        nprobe: usize,
        centroids: Vec<f32>,
        lists: Vec<Vec<u32>>,
    },
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    dim: usize,
    vectors: Vec<f32>,
    backend: PersistedBackend,
}

/// ANN index over catalogue items with disk persistence and lazy by-id
/// lookups through the metadata provider.
pub struct VectorIndex {
    dim: usize,
    index_dir: PathBuf,
    state: RwLock<IndexState>,
    metadata: Option<Arc<MetadataClient>>,
    embedder: Option<Arc<dyn Embedder>>,
    /// By-id items embedded on demand; never persisted here.
    lazy: DashMap<(ContentType, i64), CatalogueItem>,
}

impl VectorIndex {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            dim: EMBEDDING_DIM,
            index_dir: index_dir.into(),
            state: RwLock::new(IndexState::empty()),
            metadata: None,
            embedder: None,
            lazy: DashMap::new(),
        }
    }

    /// Enable on-demand fetch+embed for ids missing from the index.
    pub fn with_lazy_fetch(
        mut self,
        metadata: Arc<MetadataClient>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        self.metadata = Some(metadata);
        self.embedder = Some(embedder);
        self
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, content_type: ContentType, tmdb_id: i64) -> bool {
        self.state.read().keys.contains_key(&(content_type, tmdb_id))
    }

    /// Append one item. Returns `false` (and stores nothing) for items below
    /// the rating floor or with a wrong-sized embedding. Duplicate keys are
    /// the caller's concern; see [`VectorIndex::upsert`].
    pub fn add(&self, item: CatalogueItem) -> bool {
        if item.vote_average < MIN_VOTE_AVERAGE {
            return false;
        }
        if item.embedding.len() != self.dim {
            warn!(
                tmdb_id = item.tmdb_id,
                len = item.embedding.len(),
                "Rejecting item with wrong embedding dimension"
            );
            return false;
        }

        let mut state = self.state.write();
        let idx = state.len();

        state.vectors.extend_from_slice(&item.embedding);
        state.keys.insert(item.key(), idx);

        if let Backend::Ivf(ivf) = &mut state.backend {
            let cluster = nearest_centroid(&ivf.centroids, self.dim, &item.embedding);
            ivf.lists[cluster].push(idx as u32);
            ivf.assignments.push(cluster as u32);
        }

        state.payloads.push(item);
        debug_assert_eq!(state.vectors.len(), state.payloads.len() * self.dim);
        true
    }

    /// Overwrite the row holding this item's key. Returns `false` when the
    /// key is unknown or the item fails the add checks.
    pub fn replace(&self, item: CatalogueItem) -> bool {
        if item.vote_average < MIN_VOTE_AVERAGE || item.embedding.len() != self.dim {
            return false;
        }

        let mut state = self.state.write();
        let idx = match state.keys.get(&item.key()) {
            Some(&idx) => idx,
            None => return false,
        };

        let dim = self.dim;
        state.vectors[idx * dim..(idx + 1) * dim].copy_from_slice(&item.embedding);

        if let Backend::Ivf(ivf) = &mut state.backend {
            let old = ivf.assignments[idx] as usize;
            let new = nearest_centroid(&ivf.centroids, dim, &item.embedding);
            if old != new {
                ivf.lists[old].retain(|&row| row as usize != idx);
                ivf.lists[new].push(idx as u32);
                ivf.assignments[idx] = new as u32;
            }
        }

        state.payloads[idx] = item;
        true
    }

    /// Replace when the key exists, append otherwise.
    pub fn upsert(&self, item: CatalogueItem) -> bool {
        if self.contains(item.content_type, item.tmdb_id) {
            self.replace(item)
        } else {
            self.add(item)
        }
    }

    /// Top-k items by inner product. With a content-type filter, the backend
    /// over-fetches 2k rows so the filtered result can still fill k.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        content_type: Option<ContentType>,
    ) -> Vec<ScoredItem> {
        if k == 0 || query.len() != self.dim {
            return Vec::new();
        }

        let state = self.state.read();
        if state.len() == 0 {
            return Vec::new();
        }

        let fetch_k = if content_type.is_some() { k * 2 } else { k };
        let top = match &state.backend {
            Backend::Flat => top_rows(&state, self.dim, query, fetch_k, 0..state.len()),
            Backend::Ivf(ivf) => {
                let mut probes = centroid_ranking(&ivf.centroids, self.dim, query);
                probes.truncate(ivf.nprobe);
                let rows = probes
                    .iter()
                    .flat_map(|&c| ivf.lists[c].iter().map(|&row| row as usize))
                    .collect::<Vec<_>>();
                top_rows(&state, self.dim, query, fetch_k, rows.into_iter())
            }
        };

        top.into_iter()
            .filter(|&(idx, _)| match content_type {
                Some(ct) => state.payloads[idx].content_type == ct,
                None => true,
            })
            .take(k)
            .map(|(idx, score)| ScoredItem {
                item: state.payloads[idx].clone(),
                score,
            })
            .collect()
    }

    /// Payload + embedding for one id. Falls back to an on-demand metadata
    /// fetch and encode for ids the index has never seen; those items live in
    /// a side cache and are never persisted here.
    pub async fn search_by_id(
        &self,
        content_type: ContentType,
        tmdb_id: i64,
    ) -> Result<Option<(CatalogueItem, Vec<f32>)>, GatewayError> {
        {
            let state = self.state.read();
            if let Some(&idx) = state.keys.get(&(content_type, tmdb_id)) {
                let item = state.payloads[idx].clone();
                let vector = state.row(idx, self.dim).to_vec();
                return Ok(Some((item, vector)));
            }
        }

        if let Some(cached) = self.lazy.get(&(content_type, tmdb_id)) {
            let item = cached.value().clone();
            let vector = item.embedding.clone();
            return Ok(Some((item, vector)));
        }

        let (metadata, embedder) = match (&self.metadata, &self.embedder) {
            (Some(m), Some(e)) => (m, e),
            _ => return Ok(None),
        };

        let response = metadata.details(content_type, tmdb_id).await;
        if !response.success {
            return Ok(None);
        }

        let mut item = match parse_detail(content_type, &response.data) {
            Some(item) => item,
            None => return Ok(None),
        };

        let text = item.embedding_text();
        if text.is_empty() {
            return Ok(None);
        }

        item.embedding = embedder.embed(&text).await?;
        let vector = item.embedding.clone();
        self.lazy.insert((content_type, tmdb_id), item.clone());

        Ok(Some((item, vector)))
    }

    /// Write vectors and payloads to `INDEX_DIR` (temp file, fsync, rename).
    pub fn persist(&self) -> Result<(), GatewayError> {
        let state = self.state.read();

        let persisted = PersistedIndex {
            dim: self.dim,
            vectors: state.vectors.clone(),
            backend: match &state.backend {
                Backend::Flat => PersistedBackend::Flat,
                Backend::Ivf(ivf) => PersistedBackend::Ivf {
                    nprobe: ivf.nprobe,
                    centroids: ivf.centroids.clone(),
                    lists: ivf.lists.clone(),
                },
            },
        };

        let index_bytes = bincode::serialize(&persisted)
            .map_err(|e| GatewayError::Fatal(format!("index serialization failed: {}", e)))?;
        let payload_bytes = bincode::serialize(&state.payloads)
            .map_err(|e| GatewayError::Fatal(format!("payload serialization failed: {}", e)))?;

        fs::create_dir_all(&self.index_dir)
            .map_err(|e| GatewayError::Fatal(format!("cannot create index dir: {}", e)))?;

        write_atomic(&self.index_dir.join(INDEX_FILE), &index_bytes)?;
        write_atomic(&self.index_dir.join(PAYLOAD_FILE), &payload_bytes)?;

        info!(items = state.len(), "Vector index persisted");
        Ok(())
    }

    /// Load both files from `INDEX_DIR`. Any missing or corrupt file leaves
    /// the index empty.
    pub fn load(&self) {
        let loaded = self.try_load();
        if let Err(e) = loaded {
            warn!(error = %e, "Index load failed, starting empty");
            *self.state.write() = IndexState::empty();
        }
    }

    fn try_load(&self) -> Result<(), GatewayError> {
        let index_bytes = fs::read(self.index_dir.join(INDEX_FILE))
            .map_err(|e| GatewayError::Transient(format!("index file unreadable: {}", e)))?;
        let payload_bytes = fs::read(self.index_dir.join(PAYLOAD_FILE))
            .map_err(|e| GatewayError::Transient(format!("payload file unreadable: {}", e)))?;

        let persisted: PersistedIndex = bincode::deserialize(&index_bytes)
            .map_err(|e| GatewayError::Transient(format!("index file corrupt: {}", e)))?;
        let payloads: Vec<CatalogueItem> = bincode::deserialize(&payload_bytes)
            .map_err(|e| GatewayError::Transient(format!("payload file corrupt: {}", e)))?;

        if persisted.dim != self.dim || persisted.vectors.len() != payloads.len() * self.dim {
            return Err(GatewayError::Transient(
                "index and payload files disagree".into(),
            ));
        }

        let keys = payloads
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.key(), idx))
            .collect();

        let backend = match persisted.backend {
            PersistedBackend::Flat => Backend::Flat,
            PersistedBackend::Ivf {
                nprobe,
                centroids,
                lists,
            } => {
                let mut assignments = vec![0u32; payloads.len()];
                for (cluster, list) in lists.iter().enumerate() {
                    for &row in list {
                        assignments[row as usize] = cluster as u32;
                    }
                }
                Backend::Ivf(IvfBackend {
                    nprobe,
                    centroids,
                    lists,
                    assignments,
                })
            }
        };

        let mut state = self.state.write();
        *state = IndexState {
            vectors: persisted.vectors,
            payloads,
            keys,
            backend,
        };

        info!(items = state.len(), "Vector index loaded from disk");
        Ok(())
    }

    /// Switch from the flat scan to the IVF layout once the catalogue is
    /// large enough. Returns whether the switch happened.
    pub fn optimize_if_large(&self) -> bool {
        let n = {
            let state = self.state.read();
            if matches!(state.backend, Backend::Ivf(_)) {
                return false;
            }
            state.len()
        };

        if n <= IVF_THRESHOLD {
            return false;
        }

        let nlist = (n / 100).min(4096).max(1);
        self.optimize_with_nlist(nlist)
    }

    pub(crate) fn optimize_with_nlist(&self, nlist: usize) -> bool {
        let mut state = self.state.write();
        let n = state.len();
        if n == 0 || nlist == 0 {
            return false;
        }

        let nlist = nlist.min(n);
        let ivf = build_ivf(
            &state.vectors,
            self.dim,
            n,
            nlist,
            &mut rand::thread_rng(),
        );

        info!(items = n, nlist, nprobe = ivf.nprobe, "Switched index to IVF layout");
        state.backend = Backend::Ivf(ivf);
        true
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        let movies = state
            .payloads
            .iter()
            .filter(|p| p.content_type == ContentType::Movie)
            .count();

        IndexStats {
            total: state.len(),
            movies,
            tv: state.len() - movies,
            optimized: matches!(state.backend, Backend::Ivf(_)),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), GatewayError> {
    let tmp = path.with_extension("tmp");

    let mut file = fs::File::create(&tmp)
        .map_err(|e| GatewayError::Fatal(format!("cannot create {}: {}", tmp.display(), e)))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| GatewayError::Fatal(format!("cannot write {}: {}", tmp.display(), e)))?;
    drop(file);

    fs::rename(&tmp, path)
        .map_err(|e| GatewayError::Fatal(format!("cannot rename {}: {}", tmp.display(), e)))
}

fn dot(dim: usize, vectors: &[f32], idx: usize, query: &[f32]) -> f32 {
    let row = &vectors[idx * dim..(idx + 1) * dim];
    row.iter().zip(query).map(|(a, b)| a * b).sum()
}

/// Top rows by inner product among the given candidates, sorted descending.
fn top_rows(
    state: &IndexState,
    dim: usize,
    query: &[f32],
    k: usize,
    rows: impl Iterator<Item = usize>,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = rows
        .map(|idx| (idx, dot(dim, &state.vectors, idx, query)))
        .collect();

    scored.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

fn nearest_centroid(centroids: &[f32], dim: usize, v: &[f32]) -> usize {
    let n = centroids.len() / dim;
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for c in 0..n {
        let score: f32 = centroids[c * dim..(c + 1) * dim]
            .iter()
            .zip(v)
            .map(|(a, b)| a * b)
            .sum();
        if score > best_score {
            best_score = score;
            best = c;
        }
    }
    best
}

/// All centroid indices ordered by decreasing similarity to the query.
fn centroid_ranking(centroids: &[f32], dim: usize, query: &[f32]) -> Vec<usize> {
    let n = centroids.len() / dim;
    let mut ranked: Vec<(usize, f32)> = (0..n)
        .map(|c| {
            let score: f32 = centroids[c * dim..(c + 1) * dim]
                .iter()
                .zip(query)
                .map(|(a, b)| a * b)
                .sum();
            (c, score)
        })
        .collect();
    ranked.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().map(|(c, _)| c).collect()
}

/// Lloyd's k-means over unit vectors, spherical (centroids re-normalized).
fn build_ivf(vectors: &[f32], dim: usize, n: usize, nlist: usize, rng: &mut impl Rng) -> IvfBackend {
    let seeds = sample(rng, n, nlist);
    let mut centroids = Vec::with_capacity(nlist * dim);
    for seed in seeds.iter() {
        centroids.extend_from_slice(&vectors[seed * dim..(seed + 1) * dim]);
    }

    let mut assignments = vec![0u32; n];
    for _ in 0..KMEANS_ITERATIONS {
        for idx in 0..n {
            let v = &vectors[idx * dim..(idx + 1) * dim];
            assignments[idx] = nearest_centroid(&centroids, dim, v) as u32;
        }

        let mut sums = vec![0.0f32; nlist * dim];
        let mut counts = vec![0usize; nlist];
        for idx in 0..n {
            let cluster = assignments[idx] as usize;
            counts[cluster] += 1;
            for d in 0..dim {
                sums[cluster * dim + d] += vectors[idx * dim + d];
            }
        }

        for cluster in 0..nlist {
            if counts[cluster] == 0 {
                continue;
            }
            let slice = &mut sums[cluster * dim..(cluster + 1) * dim];
            let norm: f32 = slice.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in slice.iter_mut() {
                    *x /= norm;
                }
            }
            centroids[cluster * dim..(cluster + 1) * dim].copy_from_slice(slice);
        }
    }

    let mut lists = vec![Vec::new(); nlist];
    for idx in 0..n {
        let cluster = nearest_centroid(&centroids, dim, &vectors[idx * dim..(idx + 1) * dim]);
        assignments[idx] = cluster as u32;
        lists[cluster].push(idx as u32);
    }

    IvfBackend {
        // At least 8 probes (all lists when fewer exist), scaling with nlist
        nprobe: (nlist / 32).max(8).min(nlist),
        centroids,
        lists,
        assignments,
    }
}
