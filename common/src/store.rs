use crate::{FitResult, record::WaveformRecord};

/// Indexed read access to a fully materialised waveform collection.
pub trait WaveformSource {
    fn size(&self) -> usize;
    fn get(&self, index: usize) -> Option<&WaveformRecord>;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// Ordered sink for waveform records produced by the digitizer parser.
pub trait WaveformSink {
    fn append(&mut self, record: WaveformRecord);
}

/// Ordered sink for per-event fit results, keyed by event index.
pub trait FitResultSink {
    fn append_result(&mut self, event_index: usize, result: FitResult);
}

impl WaveformSource for [WaveformRecord] {
    fn size(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> Option<&WaveformRecord> {
        <[WaveformRecord]>::get(self, index)
    }
}

impl WaveformSource for Vec<WaveformRecord> {
    fn size(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> Option<&WaveformRecord> {
        self.as_slice().get(index)
    }
}

impl WaveformSink for Vec<WaveformRecord> {
    fn append(&mut self, record: WaveformRecord) {
        self.push(record);
    }
}

/// Vector-backed store used by the command line tools and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Vec<WaveformRecord>,
    results: Vec<(usize, FitResult)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[WaveformRecord] {
        &self.records
    }

    pub fn results(&self) -> &[(usize, FitResult)] {
        &self.results
    }

    pub fn into_records(self) -> Vec<WaveformRecord> {
        self.records
    }
}

impl WaveformSource for InMemoryStore {
    fn size(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Option<&WaveformRecord> {
        self.records.get(index)
    }
}

impl WaveformSink for InMemoryStore {
    fn append(&mut self, record: WaveformRecord) {
        self.records.push(record);
    }
}

impl FitResultSink for InMemoryStore {
    fn append_result(&mut self, event_index: usize, result: FitResult) {
        self.results.push((event_index, result));
    }
}
