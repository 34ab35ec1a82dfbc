use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One corpus entry. Fields other than `id` and `description` are carried in
/// `metadata` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CorpusRecord {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id: id.into(), description: description.into(), metadata: Map::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Shape of a record in the input files. Ids may be strings or numbers.
#[derive(Debug, Deserialize)]
struct InputRecord {
    id: Value,
    #[serde(default)]
    description: String,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<InputRecord> for CorpusRecord {
    type Error = anyhow::Error;

    fn try_from(input: InputRecord) -> anyhow::Result<Self> {
        let id = match input.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => bail!("record id must be a string or number, got {other}"),
        };
        Ok(CorpusRecord { id, description: input.description, metadata: input.rest })
    }
}

/// Where the corpus comes from. Called once per fit or explicit refresh.
pub trait CorpusSource: Send + Sync {
    fn fetch_all(&self) -> anyhow::Result<Vec<CorpusRecord>>;
}

impl CorpusSource for Vec<CorpusRecord> {
    fn fetch_all(&self) -> anyhow::Result<Vec<CorpusRecord>> {
        Ok(self.clone())
    }
}

/// Reads records from a `.json` file (array or single object), a `.jsonl`
/// file, or a directory walked for both.
pub struct JsonCorpusSource {
    path: PathBuf,
}

impl JsonCorpusSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn files(&self) -> Vec<PathBuf> {
        if !self.path.is_dir() {
            return vec![self.path.clone()];
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file())
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("json" | "jsonl")))
            .collect();
        // Directory walk order is filesystem-dependent; the corpus order must not be.
        files.sort();
        files
    }
}

impl CorpusSource for JsonCorpusSource {
    fn fetch_all(&self) -> anyhow::Result<Vec<CorpusRecord>> {
        let mut records = Vec::new();
        for file in self.files() {
            let before = records.len();
            match file.extension().and_then(|e| e.to_str()) {
                Some("jsonl") => read_jsonl(&file, &mut records)?,
                _ => read_json(&file, &mut records)?,
            }
            tracing::debug!(file = %file.display(), records = records.len() - before, "read corpus file");
        }
        Ok(records)
    }
}

fn read_jsonl(file: &Path, out: &mut Vec<CorpusRecord>) -> anyhow::Result<()> {
    let f = File::open(file).with_context(|| format!("open {}", file.display()))?;
    let reader = BufReader::new(f);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let input: InputRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), lineno + 1))?;
        out.push(input.try_into()?);
    }
    Ok(())
}

fn read_json(file: &Path, out: &mut Vec<CorpusRecord>) -> anyhow::Result<()> {
    let f = File::open(file).with_context(|| format!("open {}", file.display()))?;
    let json: Value = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse {}", file.display()))?;
    match json {
        Value::Array(arr) => {
            for v in arr {
                let input: InputRecord = serde_json::from_value(v)?;
                out.push(input.try_into()?);
            }
        }
        Value::Object(_) => {
            let input: InputRecord = serde_json::from_value(json)?;
            out.push(input.try_into()?);
        }
        _ => bail!("{}: expected a JSON array or object", file.display()),
    }
    Ok(())
}
