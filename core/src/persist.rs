//! Persisted model format.
//!
//! Layout of the bytes returned by [`persist`]:
//!
//! - magic: `b"TUTORIDX"`
//! - version: u32 (little-endian)
//! - payload_len: u64 (little-endian)
//! - checksum: u32, CRC32 of the payload (little-endian)
//! - payload: bincode-encoded [`ModelFile`]
//!
//! An index directory holds `model.bin` with those bytes and a human readable
//! `meta.json`.

use crate::corpus::CorpusRecord;
use crate::error::{Result, RetrievalError};
use crate::index::{Index, TfMode, Vocabulary};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const MAGIC: &[u8; 8] = b"TUTORIDX";
pub const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 8 + 4 + 8 + 4;

#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    tf_mode: TfMode,
    dimension: u64,
    num_records: u64,
    terms: Vec<String>,
    weights: Vec<f32>,
    records: Vec<RecordFile>,
    /// Row-major, `num_records * dimension`.
    vectors: Vec<f32>,
}

/// bincode cannot encode arbitrary JSON values, so metadata travels as text.
#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    id: String,
    description: String,
    metadata_json: String,
}

fn corrupt(msg: impl Into<String>) -> RetrievalError {
    RetrievalError::CorruptIndex(msg.into())
}

/// Serialize a fitted index. Same index, same bytes.
pub fn persist(index: &Index) -> Result<Vec<u8>> {
    let records = index
        .records()
        .iter()
        .map(|r| {
            Ok(RecordFile {
                id: r.id.clone(),
                description: r.description.clone(),
                metadata_json: serde_json::to_string(&r.metadata).map_err(|e| corrupt(e.to_string()))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let model = ModelFile {
        tf_mode: index.tf_mode(),
        dimension: index.dimension() as u64,
        num_records: index.len() as u64,
        terms: index.vocabulary().terms().to_vec(),
        weights: index.weights().to_vec(),
        records,
        vectors: index.raw_vectors().to_vec(),
    };
    let payload = bincode::serialize(&model).map_err(|e| corrupt(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode and validate bytes produced by [`persist`]. Any mismatch is
/// reported as [`RetrievalError::CorruptIndex`]; nothing partial is returned.
pub fn load(bytes: &[u8]) -> Result<Index> {
    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!("{} bytes is shorter than the header", bytes.len())));
    }
    if &bytes[0..8] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = u32::from_le_bytes(bytes[8..12].try_into().map_err(|_| corrupt("header"))?);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}, expected {FORMAT_VERSION}")));
    }
    let payload_len = u64::from_le_bytes(bytes[12..20].try_into().map_err(|_| corrupt("header"))?);
    let checksum = u32::from_le_bytes(bytes[20..24].try_into().map_err(|_| corrupt("header"))?);
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() as u64 != payload_len {
        return Err(corrupt(format!("payload is {} bytes, header declares {payload_len}", payload.len())));
    }
    if crc32fast::hash(payload) != checksum {
        return Err(corrupt("checksum mismatch"));
    }

    let model: ModelFile = bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))?;
    if model.dimension != model.terms.len() as u64 {
        return Err(corrupt(format!(
            "declared dimension {} but vocabulary has {} terms",
            model.dimension,
            model.terms.len()
        )));
    }
    if model.num_records != model.records.len() as u64 {
        return Err(corrupt(format!(
            "declared {} records but found {}",
            model.num_records,
            model.records.len()
        )));
    }
    if model.num_records.checked_mul(model.dimension) != Some(model.vectors.len() as u64) {
        return Err(corrupt("record vector length disagrees with the declared dimension"));
    }
    if !model.weights.iter().chain(model.vectors.iter()).all(|x| x.is_finite()) {
        return Err(corrupt("non-finite weight or vector component"));
    }

    let records = model
        .records
        .into_iter()
        .map(|r| {
            let metadata = serde_json::from_str(&r.metadata_json)
                .map_err(|e| corrupt(format!("metadata of record {:?}: {e}", r.id)))?;
            Ok(CorpusRecord { id: r.id, description: r.description, metadata })
        })
        .collect::<Result<Vec<_>>>()?;
    let vocabulary = Vocabulary::from_terms(model.terms)?;
    Index::from_parts(vocabulary, model.weights, model.tf_mode, records, model.vectors)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_records: usize,
    pub dimension: usize,
    pub tf_mode: TfMode,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn model(&self) -> PathBuf { self.root.join("model.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Write `model.bin` and `meta.json`. Both go to temp files first and are
/// renamed into place only once both writes succeeded, so a failed save
/// leaves the previous index on disk untouched.
pub fn save_index(paths: &IndexPaths, index: &Index) -> Result<()> {
    fs::create_dir_all(&paths.root)?;
    let bytes = persist(index)?;
    let meta = MetaFile {
        num_records: index.len(),
        dimension: index.dimension(),
        tf_mode: index.tf_mode(),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        version: FORMAT_VERSION,
    };
    let meta_json = serde_json::to_vec_pretty(&meta).map_err(std::io::Error::from)?;

    let model_tmp = tmp_path(&paths.model());
    let meta_tmp = tmp_path(&paths.meta());
    let written = write_synced(&model_tmp, &bytes).and_then(|_| write_synced(&meta_tmp, &meta_json));
    if written.is_err() {
        let _ = fs::remove_file(&model_tmp);
        let _ = fs::remove_file(&meta_tmp);
        return written;
    }
    fs::rename(&model_tmp, paths.model())?;
    fs::rename(&meta_tmp, paths.meta())?;
    tracing::info!(root = %paths.root.display(), records = meta.num_records, dimension = meta.dimension, "index saved");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

pub fn load_index(paths: &IndexPaths) -> Result<Index> {
    let mut f = File::open(paths.model())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let index = load(&buf)?;
    tracing::info!(root = %paths.root.display(), records = index.len(), dimension = index.dimension(), "index loaded");
    Ok(index)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    fs::create_dir_all(&paths.root)?;
    let json = serde_json::to_vec_pretty(meta).map_err(std::io::Error::from)?;
    let tmp = tmp_path(&paths.meta());
    let written = write_synced(&tmp, &json);
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
        return written;
    }
    fs::rename(&tmp, paths.meta())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = fs::read_to_string(paths.meta())?;
    let meta: MetaFile = serde_json::from_str(&buf).map_err(std::io::Error::from)?;
    Ok(meta)
}
