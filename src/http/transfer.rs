// file: src/http/transfer.rs
// description: byte counters reported while a response body downloads

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

impl TransferProgress {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self { loaded, total }
    }

    /// Rounded percentage in `0..=100`. An unknown or empty total counts as
    /// complete.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let ratio = self.loaded.min(self.total) as f64 / self.total as f64;
        (ratio * 100.0).round() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.total == 0 || self.loaded >= self.total
    }
}
