//! Candidate input files.
//!
//! A source is either a CSV table (one column holds the candidates) or a
//! plain list with one entry per line. List files skip blank lines and `#`
//! comments.

use crate::error::PipelineError;
use crate::types::Candidate;
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which CSV column holds the candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    /// Zero-based column index
    Index(usize),
    /// Header name
    Name(String),
}

impl Default for ColumnSelector {
    fn default() -> Self {
        ColumnSelector::Index(0)
    }
}

impl FromStr for ColumnSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Column cannot be empty".to_string());
        }
        Ok(match s.parse::<usize>() {
            Ok(index) => ColumnSelector::Index(index),
            Err(_) => ColumnSelector::Name(s.to_string()),
        })
    }
}

/// Reader for one candidate input file.
#[derive(Debug, Clone)]
pub struct CandidateSource {
    path: PathBuf,
    column: ColumnSelector,
    has_header: bool,
    limit: Option<usize>,
    exact_dedup: bool,
}

impl CandidateSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            column: ColumnSelector::default(),
            has_header: true,
            limit: None,
            exact_dedup: false,
        }
    }

    pub fn with_column(mut self, column: ColumnSelector) -> Self {
        self.column = column;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Drop exact repeats (first occurrence kept) before the limit is applied.
    pub fn with_exact_dedup(mut self, exact_dedup: bool) -> Self {
        self.exact_dedup = exact_dedup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw candidate strings in file order.
    pub fn read_raw(&self) -> Result<Vec<String>, PipelineError> {
        let path_name = self.path.to_string_lossy().to_string();
        if !self.path.exists() {
            return Err(PipelineError::file_error(path_name, "File not found"));
        }

        let mut file = fs::File::open(&self.path)
            .map_err(|e| PipelineError::file_error(&path_name, e.to_string()))?;
        let mut entries = if is_list_file(&self.path) {
            let mut content = String::new();
            file.read_to_string(&mut content)
                .map_err(|e| PipelineError::file_error(&path_name, e.to_string()))?;
            parse_list(&content)
        } else {
            self.parse_csv(file, &path_name)?
        };

        if self.exact_dedup {
            let mut seen = HashSet::new();
            entries.retain(|entry| seen.insert(entry.clone()));
        }
        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }

        Ok(entries)
    }

    /// Read the file and build one [`Candidate`] per entry.
    pub fn read(&self) -> Result<Vec<Candidate>, PipelineError> {
        Ok(self.read_raw()?.into_iter().map(Candidate::new).collect())
    }

    fn parse_csv<R: Read>(&self, input: R, path_name: &str) -> Result<Vec<String>, PipelineError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_header)
            .flexible(true)
            .from_reader(input);

        let index = match &self.column {
            ColumnSelector::Index(index) => *index,
            ColumnSelector::Name(name) => {
                if !self.has_header {
                    return Err(PipelineError::config(format!(
                        "Column '{}' selected by name but {} is read without a header",
                        name, path_name
                    )));
                }
                reader
                    .headers()?
                    .iter()
                    .position(|header| header.trim() == name)
                    .ok_or_else(|| {
                        PipelineError::config(format!(
                            "Column '{}' not found in {}",
                            name, path_name
                        ))
                    })?
            }
        };

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            if let Some(cell) = record.get(index) {
                let cell = cell.trim();
                if !cell.is_empty() {
                    entries.push(cell.to_string());
                }
            }
        }
        Ok(entries)
    }
}

fn is_list_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref(),
        Some("txt" | "list")
    )
}

/// Entries of a list file: blank lines and `#` comments (full-line or
/// trailing) are skipped.
fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let entry = line.split('#').next().unwrap_or("").trim();
            (!entry.is_empty()).then(|| entry.to_string())
        })
        .collect()
}
