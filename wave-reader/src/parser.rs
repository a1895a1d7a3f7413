use pulsefit_common::record::WaveformRecord;
use std::io::BufRead;

/* Record block layout, as written by the digitizer software:

Record Length: 5000
BoardID: 31
Channel: 0
Event Number: 14322
Pattern: 0x0000
Trigger Time Stamp: 1595551493
DC offset (DAC): 0x3333
<sample>
<sample>
...                       (exactly `Record Length` sample lines)
*/

const HEADER_FIELDS: usize = 7;

/// How one attempt at decoding a block ended.
#[derive(Debug, PartialEq)]
pub(crate) enum Block {
    Complete(WaveformRecord),
    /// The stream was exhausted before any header field of a new block.
    EndOfStream,
    /// The stream ended or turned malformed partway through a block.
    Truncated,
}

fn parse_prefixed_u32(value: &str) -> Option<u32> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

pub(crate) fn read_block(input: &mut impl BufRead) -> Block {
    let mut record = WaveformRecord::invalid();
    let mut fields_seen = 0;
    let mut line = String::new();

    let truncation = |fields_seen| {
        if fields_seen == 0 {
            Block::EndOfStream
        } else {
            Block::Truncated
        }
    };

    while fields_seen < HEADER_FIELDS {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return truncation(fields_seen),
            Ok(_) => {}
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let parsed = match key.trim() {
            "Record Length" => value.parse().map(|v| record.record_length = v).is_ok(),
            "BoardID" => value.parse().map(|v| record.board_id = v).is_ok(),
            "Channel" => value.parse().map(|v| record.channel = v).is_ok(),
            "Event Number" => value.parse().map(|v| record.event_number = v).is_ok(),
            "Pattern" => {
                record.pattern = value.to_owned();
                true
            }
            "Trigger Time Stamp" => value
                .parse()
                .map(|v| record.trigger_timestamp = v)
                .is_ok(),
            "DC offset (DAC)" => parse_prefixed_u32(value)
                .map(|v| record.dc_offset = v)
                .is_some(),
            // Lines between blocks that are not header fields are skipped.
            _ => continue,
        };
        if !parsed {
            return Block::Truncated;
        }
        fields_seen += 1;
    }

    if record.record_length <= 0 {
        return Block::Truncated;
    }

    let mut samples = Vec::with_capacity(record.record_length as usize);
    for _ in 0..record.record_length {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return Block::Truncated,
            Ok(_) => {}
        }
        match line.trim().parse() {
            Ok(sample) => samples.push(sample),
            Err(_) => return Block::Truncated,
        }
    }
    record.samples = samples;
    Block::Complete(record)
}

/// Decodes the next record block from `input`.
///
/// Never fails: on end of stream, or when the block is truncated or
/// malformed, the invalid sentinel record is returned instead. Callers
/// check [`WaveformRecord::is_valid`] and stop at the first invalid record.
pub fn read_single_wave(input: &mut impl BufRead) -> WaveformRecord {
    match read_block(input) {
        Block::Complete(record) => record,
        Block::EndOfStream | Block::Truncated => WaveformRecord::invalid(),
    }
}
