//! CSV output table.
//!
//! The sink buffers every row of a run and writes a single table at the
//! end. The header is written even when no row was accepted.

use crate::error::PipelineError;
use crate::types::FeatureRow;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    /// The candidate identity (domain, page URL or file name)
    Identity(String),
    Feature(String),
    Label,
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Identity(name) | Column::Feature(name) => name,
            Column::Label => "label",
        }
    }
}

/// `identity, features..., label`.
pub fn identity_first<S: AsRef<str>>(identity: &str, features: &[S]) -> Vec<Column> {
    let mut columns = vec![Column::Identity(identity.to_string())];
    columns.extend(features.iter().map(|f| Column::Feature(f.as_ref().to_string())));
    columns.push(Column::Label);
    columns
}

/// `features..., identity, label`.
pub fn identity_last<S: AsRef<str>>(identity: &str, features: &[S]) -> Vec<Column> {
    let mut columns: Vec<Column> = features
        .iter()
        .map(|f| Column::Feature(f.as_ref().to_string()))
        .collect();
    columns.push(Column::Identity(identity.to_string()));
    columns.push(Column::Label);
    columns
}

/// Buffered CSV table with a fixed column layout.
#[derive(Debug, Clone)]
pub struct CsvSink {
    columns: Vec<Column>,
    rows: Vec<FeatureRow>,
}

impl CsvSink {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: FeatureRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Write the header and every buffered row.
    ///
    /// A feature missing from a row is written as an empty cell.
    pub fn write_to<W: Write>(&self, output: W) -> Result<(), PipelineError> {
        let mut writer = csv::Writer::from_writer(output);
        writer.write_record(self.header())?;

        for row in &self.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|column| match column {
                    Column::Identity(_) => row.identity.clone(),
                    Column::Feature(name) => {
                        row.features.get(name).map(format_value).unwrap_or_default()
                    }
                    Column::Label => row.label.value().to_string(),
                })
                .collect();
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            PipelineError::file_error(
                path.to_string_lossy(),
                format!("Failed to create output file: {}", e),
            )
        })?;
        self.write_to(file)
    }
}

/// Integral values are written without a fractional part.
pub fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
