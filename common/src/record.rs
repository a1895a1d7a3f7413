use crate::{BoardId, Channel, EventNumber, Sample, TriggerTimestamp};

/// One digitized pulse as emitted by the digitizer: the seven header fields
/// of a record block plus `record_length` amplitude samples in raw counts.
///
/// A `record_length` of zero or less is the end-of-stream / parse-failure
/// sentinel; such a record carries no samples and must not be processed.
/// Records are immutable once constructed; processing stages copy the
/// samples before mutating them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformRecord {
    pub record_length: i32,
    pub board_id: BoardId,
    pub channel: Channel,
    pub event_number: EventNumber,
    pub pattern: String,
    pub trigger_timestamp: TriggerTimestamp,
    pub dc_offset: u32,
    pub samples: Vec<Sample>,
}

impl WaveformRecord {
    /// The sentinel returned in place of a record that could not be read.
    pub fn invalid() -> Self {
        Self {
            record_length: -1,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.record_length > 0 && self.samples.len() == self.record_length as usize
    }
}
