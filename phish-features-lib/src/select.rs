//! Column selection over an existing feature table.

use crate::error::PipelineError;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Copy `input` to `output` keeping only `columns`, in the requested order.
///
/// Fails before writing anything if one or more requested columns are
/// missing; the error lists all of them. Returns the number of data rows.
pub fn select_columns<R: Read, W: Write>(
    input: R,
    output: W,
    columns: &[String],
) -> Result<usize, PipelineError> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();

    let mut indices = Vec::with_capacity(columns.len());
    let mut missing = Vec::new();
    for column in columns {
        match headers.iter().position(|header| header == column) {
            Some(index) => indices.push(index),
            None => missing.push(column.as_str()),
        }
    }

    if !missing.is_empty() {
        return Err(PipelineError::config(format!(
            "Missing columns in input: {}",
            missing.join(", ")
        )));
    }

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(columns)?;

    let mut count = 0;
    for record in reader.records() {
        let record = record?;
        writer.write_record(indices.iter().map(|&i| record.get(i).unwrap_or("")))?;
        count += 1;
    }

    writer.flush()?;
    Ok(count)
}

/// File-to-file variant of [`select_columns`].
pub fn select_columns_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    columns: &[String],
) -> Result<usize, PipelineError> {
    let input = input.as_ref();
    let reader = File::open(input).map_err(|e| {
        PipelineError::file_error(input.to_string_lossy(), e.to_string())
    })?;

    // Validate against the header before the output file is created.
    let mut buffer = Vec::new();
    let rows = select_columns(reader, &mut buffer, columns)?;

    let output = output.as_ref();
    let mut file = File::create(output).map_err(|e| {
        PipelineError::file_error(output.to_string_lossy(), e.to_string())
    })?;
    file.write_all(&buffer)?;
    Ok(rows)
}
