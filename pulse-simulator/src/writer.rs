use pulsefit_common::record::WaveformRecord;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

/// Writes records in the digitizer text block format, one seven-line header
/// and `record_length` sample lines per record.
pub fn write_digitizer_file(path: &Path, records: &[WaveformRecord]) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for record in records {
        write_record(&mut file, record)?;
    }
    file.flush()?;
    Ok(())
}

fn write_record(out: &mut impl Write, record: &WaveformRecord) -> io::Result<()> {
    writeln!(out, "Record Length: {}", record.record_length)?;
    writeln!(out, "BoardID: {}", record.board_id)?;
    writeln!(out, "Channel: {}", record.channel)?;
    writeln!(out, "Event Number: {}", record.event_number)?;
    writeln!(out, "Pattern: {}", record.pattern)?;
    writeln!(out, "Trigger Time Stamp: {}", record.trigger_timestamp)?;
    writeln!(out, "DC offset (DAC): 0x{:04x}", record.dc_offset)?;
    for sample in &record.samples {
        writeln!(out, "{sample}")?;
    }
    Ok(())
}
