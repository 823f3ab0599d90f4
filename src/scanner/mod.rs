//! Discovery sources
//!
//! A [`DiscoverySource`] performs one sweep and yields (IP, MAC) observations.
//! Failures degrade to an empty or partial batch; a sweep never errors.

mod neighbor;

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use crate::models::Observation;

pub use neighbor::{parse_neighbor_table, NeighborTableDiscovery};

pub trait DiscoverySource: Send + Sync {
    /// Sweep `target` (interface name, empty for all) within `timeout`
    fn scan<'a>(
        &'a self,
        target: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Vec<Observation>> + Send + 'a>>;
}

/// Replays fixed batches, one per sweep; the last batch repeats
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    batches: Mutex<Vec<Vec<Observation>>>,
}

impl StaticDiscovery {
    pub fn new(batches: Vec<Vec<Observation>>) -> Self {
        let mut batches = batches;
        batches.reverse();
        Self {
            batches: Mutex::new(batches),
        }
    }

    fn next_batch(&self) -> Vec<Observation> {
        let mut batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        match batches.len() {
            0 => Vec::new(),
            1 => batches[0].clone(),
            _ => batches.pop().unwrap_or_default(),
        }
    }
}

impl DiscoverySource for StaticDiscovery {
    fn scan<'a>(
        &'a self,
        _target: &'a str,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Vec<Observation>> + Send + 'a>> {
        Box::pin(async move { self.next_batch() })
    }
}
