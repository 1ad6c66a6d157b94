//! Corpus loading and dataset persistence.
//!
//! The corpus and `DatasetStore::load_samples` never fail: a missing or
//! malformed file is logged and read as empty, so callers check for
//! emptiness. Resume paths use the strict readers (`read_samples`,
//! `load_or_seed`, `CategoryStore`) so an unreadable file is never
//! overwritten. Saves replace the whole document atomically (write temp,
//! then rename) and keep the previous version as `<name>.backup.json`.

use crate::models::{CategoryRecord, CompetitionType, CpsEvalError, Problem, Result, Sample};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Load the problem corpus.
///
/// Accepts a JSON object keyed by problem id or an array of records. Each
/// record carries `problem`, `competition` and/or `competition_id`, and
/// `solutions` (an object whose values, in file order, are the reference
/// solutions; a plain array is accepted too).
pub fn load_problems(path: &Path) -> Vec<Problem> {
    let value = match read_json(path) {
        Some(value) => value,
        None => return Vec::new(),
    };

    let records: Vec<(Option<String>, Map<String, Value>)> = match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(id, record)| match record {
                Value::Object(fields) => Some((Some(id), fields)),
                _ => {
                    warn!(problem_id = %id, "Corpus entry is not an object, skipping");
                    None
                }
            })
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|record| match record {
                Value::Object(fields) => Some((None, fields)),
                _ => None,
            })
            .collect(),
        _ => {
            error!(path = %path.display(), "Corpus must be a JSON object or array");
            return Vec::new();
        }
    };

    let problems: Vec<Problem> = records
        .into_iter()
        .enumerate()
        .map(|(index, (key, fields))| parse_problem(index, key, &fields))
        .collect();

    info!(path = %path.display(), problems = problems.len(), "Corpus loaded");
    problems
}

/// Build a problem from one corpus record.
///
/// The competition comes from `competition`, else `competition_id`. A record
/// with neither is `Other("other")` and so scores at the fallback difficulty
/// of 0.5 rather than being assumed to be AMC 8.
fn parse_problem(index: usize, key: Option<String>, fields: &Map<String, Value>) -> Problem {
    let text_field = |name: &str| fields.get(name).and_then(Value::as_str).map(str::to_string);

    let problem_id = text_field("problem_id")
        .filter(|id| !id.is_empty())
        .or(key)
        .unwrap_or_else(|| format!("problem_{index}"));
    let competition_id = text_field("competition_id").unwrap_or_default();
    let competition = text_field("competition")
        .filter(|c| !c.trim().is_empty())
        .or_else(|| (!competition_id.is_empty()).then(|| competition_id.clone()))
        .map_or_else(
            || CompetitionType::Other("other".to_string()),
            |c| CompetitionType::parse(&c),
        );

    let reference_solutions = match fields.get("solutions") {
        Some(Value::Object(solutions)) => solutions.values().filter_map(solution_text).collect(),
        Some(Value::Array(solutions)) => solutions.iter().filter_map(solution_text).collect(),
        _ => Vec::new(),
    };

    Problem {
        problem_id,
        competition,
        competition_id,
        text: text_field("problem").unwrap_or_default(),
        reference_solutions,
    }
}

fn solution_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn read_json(path: &Path) -> Option<Value> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Cannot open dataset file");
            return None;
        }
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Invalid JSON in dataset file");
            None
        }
    }
}

/// Load/save of a sample collection.
pub trait DatasetStore {
    /// All stored samples, or empty if none can be read.
    fn load_samples(&self) -> Vec<Sample>;

    /// Replace the stored collection.
    fn save_samples(&self, samples: &[Sample]) -> Result<()>;
}

/// Load/save of problem category records.
///
/// Unlike samples, an unreadable file is an error: resuming from an empty
/// set would overwrite it.
pub trait CategoryStore {
    /// Stored records, empty if there is no file yet.
    fn load_categories(&self) -> Result<Vec<CategoryRecord>>;

    /// Replace the stored records.
    fn save_categories(&self, records: &[CategoryRecord]) -> Result<()>;
}

/// Pretty-printed UTF-8 JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Sibling path with `suffix` in place of the extension.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "samples".to_string());
        self.path.with_file_name(format!("{stem}.{suffix}.json"))
    }

    pub fn backup_path(&self) -> PathBuf {
        self.sibling("backup")
    }

    /// Stored samples. A missing file is empty; an unreadable one is an
    /// error naming the file.
    pub fn read_samples(&self) -> Result<Vec<Sample>> {
        self.read_records()
    }

    fn read_records<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No dataset file yet");
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .map_err(|e| CpsEvalError::io(format!("opening {}", self.path.display()), e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CpsEvalError::Parse(format!("{}: {e}", self.path.display())))
    }

    fn write_records<T: Serialize>(&self, records: &[T]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CpsEvalError::io("creating output dir", e))?;
        }

        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())
                .map_err(|e| CpsEvalError::io("backing up dataset file", e))?;
        }

        let temp_path = self.sibling("tmp");
        let file = File::create(&temp_path)
            .map_err(|e| CpsEvalError::io("creating temp dataset file", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)
            .map_err(|e| CpsEvalError::Internal(format!("Serializing records: {e}")))?;
        writer
            .flush()
            .map_err(|e| CpsEvalError::io("writing temp dataset file", e))?;
        drop(writer);

        fs::rename(&temp_path, &self.path)
            .map_err(|e| CpsEvalError::io("renaming dataset file", e))?;

        debug!(path = %self.path.display(), records = records.len(), "Dataset saved");
        Ok(())
    }
}

impl DatasetStore for JsonFileStore {
    fn load_samples(&self) -> Vec<Sample> {
        self.read_samples().unwrap_or_else(|e| {
            error!(path = %self.path.display(), error = %e, "Cannot read sample file");
            Vec::new()
        })
    }

    fn save_samples(&self, samples: &[Sample]) -> Result<()> {
        self.write_records(samples)
    }
}

impl CategoryStore for JsonFileStore {
    fn load_categories(&self) -> Result<Vec<CategoryRecord>> {
        self.read_records()
    }

    fn save_categories(&self, records: &[CategoryRecord]) -> Result<()> {
        self.write_records(records)
    }
}

/// Working set for an evaluation run.
///
/// Resumes from `store` when its file exists, otherwise seeds from the
/// generated samples in `seed`. An existing file that cannot be read is an
/// error, never a reason to reseed over recorded verdicts.
pub fn load_or_seed(store: &JsonFileStore, seed: &JsonFileStore) -> Result<Vec<Sample>> {
    if store.exists() {
        let samples = store.read_samples()?;
        info!(path = %store.path().display(), samples = samples.len(), "Resuming evaluation");
        return Ok(samples);
    }

    let samples = seed.read_samples()?;
    info!(path = %seed.path().display(), samples = samples.len(), "Seeded evaluation from inference file");
    Ok(samples)
}
