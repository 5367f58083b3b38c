//! Per-epoch training history and the JSON-lines epoch log

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::utils::error::Result;
use crate::utils::metrics::{EpochMetrics, Metric};

/// Which split a metric series comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
}

/// Metrics of one finished epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 0-based epoch, continuing across phases
    pub epoch: usize,
    pub phase: String,
    pub learning_rate: f64,
    /// RFC 3339 time the epoch finished
    pub timestamp: String,
    pub train: EpochMetrics,
    pub validation: EpochMetrics,
}

impl EpochRecord {
    pub fn new(
        epoch: usize,
        phase: &str,
        learning_rate: f64,
        train: EpochMetrics,
        validation: EpochMetrics,
    ) -> Self {
        Self {
            epoch,
            phase: phase.to_string(),
            learning_rate,
            timestamp: Utc::now().to_rfc3339(),
            train,
            validation,
        }
    }

    pub fn metrics(&self, split: Split) -> &EpochMetrics {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
        }
    }
}

/// Epoch records of one training phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub records: Vec<EpochRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Epoch numbers in record order
    pub fn epochs(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.epoch).collect()
    }

    pub fn first_epoch(&self) -> Option<usize> {
        self.records.first().map(|r| r.epoch)
    }

    pub fn last_epoch(&self) -> Option<usize> {
        self.records.last().map(|r| r.epoch)
    }

    /// `(epoch, value)` pairs of one metric
    pub fn series(&self, metric: Metric, split: Split) -> Vec<(usize, f64)> {
        self.records
            .iter()
            .map(|r| (r.epoch, r.metrics(split).get(metric)))
            .collect()
    }

    /// This history followed by `other`
    pub fn concat(&self, other: &History) -> History {
        History {
            records: self.records.iter().chain(&other.records).cloned().collect(),
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Appends one JSON object per epoch to a log file
pub struct EpochLog {
    writer: BufWriter<File>,
}

impl EpochLog {
    /// Open `path` for appending, creating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Write one record and flush, so the log survives a crash mid-run
    pub fn append(&mut self, record: &EpochRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read every record back from a log file
    pub fn read_all(path: &Path) -> Result<Vec<EpochRecord>> {
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str::<EpochRecord>(line)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, loss: f64) -> EpochRecord {
        let train = EpochMetrics {
            loss,
            accuracy: 0.9,
            ..Default::default()
        };
        let validation = EpochMetrics {
            loss: loss + 0.1,
            ..Default::default()
        };
        EpochRecord::new(epoch, "classifier", 1e-4, train, validation)
    }

    #[test]
    fn test_history_series_and_epochs() {
        let mut history = History::new();
        history.push(record(0, 1.0));
        history.push(record(1, 0.5));

        assert_eq!(history.epochs(), vec![0, 1]);
        assert_eq!(history.last_epoch(), Some(1));
        assert_eq!(history.series(Metric::Loss, Split::Train), vec![(0, 1.0), (1, 0.5)]);
        assert_eq!(history.series(Metric::Accuracy, Split::Train)[0].1, 0.9);

        let val = history.series(Metric::Loss, Split::Validation);
        assert!((val[1].1 - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_concat_keeps_order() {
        let mut a = History::new();
        a.push(record(0, 1.0));
        let mut b = History::new();
        b.push(record(1, 0.8));
        b.push(record(2, 0.7));

        let all = a.concat(&b);
        assert_eq!(all.epochs(), vec![0, 1, 2]);
        assert_eq!(b.first_epoch(), Some(1));
        assert_eq!(History::new().last_epoch(), None);
    }

    #[test]
    fn test_epoch_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epochs.jsonl");

        let mut log = EpochLog::open(&path).unwrap();
        log.append(&record(0, 1.0)).unwrap();
        log.append(&record(1, 0.5)).unwrap();

        let records = EpochLog::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].epoch, 1);
        assert_eq!(records[1].train.loss, 0.5);

        // metric keys follow the reported metric names
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"f1-score\""));
    }

    #[test]
    fn test_history_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut history = History::new();
        history.push(record(3, 0.25));

        history.save_json(&path).unwrap();
        assert_eq!(History::load_json(&path).unwrap(), history);
    }
}
