// Live implementations of the collaborator traits.

mod compressor;
mod embedder;
mod generator;
mod tavily;

use std::sync::RwLock;

use anyhow::{anyhow, Result};

pub use compressor::ScaledownCompressor;
pub use embedder::Embedder;
pub use generator::Generator;
pub use tavily::TavilySearcher;

/// A provider client that `close` hands back exactly once.
///
/// Calls clone the client out of the slot, so no lock is held across an
/// await. Once released, every later call fails instead of reopening a
/// connection pool.
pub(crate) struct ClientSlot<T> {
    name: &'static str,
    client: RwLock<Option<T>>,
}

impl<T: Clone> ClientSlot<T> {
    pub(crate) fn new(name: &'static str, client: T) -> Self {
        Self {
            name,
            client: RwLock::new(Some(client)),
        }
    }

    pub(crate) fn get(&self) -> Result<T> {
        self.client
            .read()
            .map_err(|_| anyhow!("{} client lock poisoned", self.name))?
            .clone()
            .ok_or_else(|| anyhow!("{} client is closed", self.name))
    }

    /// Drop the held client. Returns false when it was already released.
    pub(crate) fn release(&self) -> bool {
        match self.client.write() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        }
    }
}
