//! JSON Lines export
//!
//! Dumps the stored catalog as one JSON object per line, suitable for
//! piping into jq or loading into downstream analysis tools.

use crate::storage::sqlite::SqliteSink;
use crate::YeonjaeError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Exports every stored novel as JSON Lines
///
/// # Arguments
///
/// * `sink` - The store to export from
/// * `output_path` - Path the JSONL file should be written to
///
/// # Returns
///
/// The number of novels exported
pub fn export_jsonl(sink: &SqliteSink, output_path: &Path) -> Result<usize, YeonjaeError> {
    let novels = sink.load_all()?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    for novel in &novels {
        serde_json::to_writer(&mut writer, novel)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(novels.len())
}
