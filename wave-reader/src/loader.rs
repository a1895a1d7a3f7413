use crate::parser::{Block, read_block};
use pulsefit_common::store::WaveformSink;
use std::io::{self, BufRead};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("decimation factor must be at least one")]
    ZeroDecimation,
}

/// Outcome of draining one digitizer stream.
#[derive(Debug, Default, PartialEq)]
pub struct LoadSummary {
    /// Complete blocks decoded, whether or not they were materialised.
    pub blocks_read: usize,
    /// Records actually appended to the sink.
    pub records_stored: usize,
    /// Set when the stream ended partway through a block. Records decoded
    /// before the truncation stand.
    pub truncated: bool,
}

/// Drains `input` into `sink`, one record per complete block.
///
/// A `cap` greater than zero bounds the number of records materialised; a
/// negative or zero cap reads to the end of the stream. A `decimation`
/// factor of k materialises only every k-th complete block, which bounds
/// the stored volume when records are only needed for template averaging.
pub fn load_waves(
    input: &mut impl BufRead,
    sink: &mut impl WaveformSink,
    cap: i64,
    decimation: usize,
) -> Result<LoadSummary, LoadError> {
    if decimation == 0 {
        return Err(LoadError::ZeroDecimation);
    }

    let mut summary = LoadSummary::default();
    while cap <= 0 || (summary.records_stored as i64) < cap {
        match read_block(input) {
            Block::Complete(record) => {
                if summary.blocks_read % decimation == 0 {
                    sink.append(record);
                    summary.records_stored += 1;
                }
                summary.blocks_read += 1;
            }
            Block::EndOfStream => break,
            Block::Truncated => {
                summary.truncated = true;
                warn!(
                    blocks_read = summary.blocks_read,
                    "digitizer stream truncated mid-block"
                );
                break;
            }
        }
    }
    Ok(summary)
}

/// Counts the record blocks in a stream without materialising any of them,
/// by counting `Record Length` header lines.
pub fn quick_scan(input: impl BufRead) -> io::Result<usize> {
    let mut events = 0;
    for line in input.lines() {
        if line?.contains("Record Length") {
            events += 1;
        }
    }
    Ok(events)
}
