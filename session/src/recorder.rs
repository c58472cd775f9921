use std::sync::mpsc::Sender;

use crate::MatchRecord;

pub type RecordError = Box<dyn std::error::Error + Send + Sync>;

/// Receives each finished match exactly once.
pub trait MatchRecorder: Send {
    fn record(&mut self, record: &MatchRecord) -> Result<(), RecordError>;
}

/// Forwards records to another thread.
impl MatchRecorder for Sender<MatchRecord> {
    fn record(&mut self, record: &MatchRecord) -> Result<(), RecordError> {
        self.send(record.clone())?;
        Ok(())
    }
}
