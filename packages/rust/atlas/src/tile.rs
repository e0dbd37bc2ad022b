//! Decoding of map tiles (Arrow IPC / Feather v2) and topic sampling.

use std::collections::HashSet;
use std::io::Cursor;

use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;
use arrow::ipc::reader::FileReader;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;

use debrief_shared::{DebriefError, Result};

/// One point of a tile, reduced to the two columns sampling needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRow {
    /// Topic label at the sampled depth (`None` for unlabeled points).
    pub topic: Option<String>,
    /// Datum identifier, stringified.
    pub id: Option<String>,
}

/// Decode a tile into `(topic, id)` rows.
///
/// Both columns are stringified, so integer id columns come out as their
/// decimal form. Compressed (LZ4/ZSTD) tiles are supported.
pub fn decode_tile(bytes: &[u8], topic_column: &str, id_column: &str) -> Result<Vec<TileRow>> {
    let reader = FileReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| DebriefError::parse(format!("invalid tile: {e}")))?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| DebriefError::parse(format!("tile batch: {e}")))?;
        let topics = column(&batch, topic_column)?;
        ensure_text(topics, topic_column)?;
        let ids = column(&batch, id_column)?;

        for i in 0..batch.num_rows() {
            rows.push(TileRow {
                topic: cell(topics, i)?,
                id: cell(ids, i)?,
            });
        }
    }

    Ok(rows)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DebriefError::parse(format!("tile has no column `{name}`")))
}

/// Topic labels must be strings, plain or dictionary-encoded.
fn ensure_text(array: &ArrayRef, name: &str) -> Result<()> {
    let is_text =
        |t: &DataType| matches!(t, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View);
    match array.data_type() {
        DataType::Dictionary(_, values) if is_text(values) => Ok(()),
        t if is_text(t) => Ok(()),
        other => Err(DebriefError::parse(format!(
            "tile column `{name}` must hold strings, found {other}"
        ))),
    }
}

fn cell(array: &ArrayRef, i: usize) -> Result<Option<String>> {
    if array.is_null(i) {
        return Ok(None);
    }
    array_value_to_string(array.as_ref(), i)
        .map(Some)
        .map_err(|e| DebriefError::parse(format!("tile cell {i}: {e}")))
}

/// Pick one representative datum per topic.
///
/// Topics are visited in order of first appearance; the id of the first row
/// carrying each topic is returned. Rows with a null topic or id are skipped.
pub fn sample_topics(rows: &[TileRow]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ids = Vec::new();

    for row in rows {
        let (Some(topic), Some(id)) = (row.topic.as_deref(), row.id.as_deref()) else {
            continue;
        };
        if seen.insert(topic) {
            ids.push(id.to_string());
        }
    }

    ids
}
