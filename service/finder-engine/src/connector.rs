//! Seam for non-local sources (mail stores, cloud mirrors).
//!
//! A connector lists items and materializes each one as a readable local
//! file; the engine then indexes the materialized paths like any other file,
//! tagged with the connector's source. Deletion pruning is scoped to
//! filesystem passes, so connector ingestion never deletes manifest entries
//! it did not produce.

use std::path::PathBuf;

use finder_model::{DocMetadata, SourceKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connector failure: {0}")]
    Other(String),
}

/// One remote object a connector can deposit locally.
#[derive(Debug, Clone)]
pub struct ConnectorItem {
    pub id: String,
    pub source: SourceKind,
    /// Remote path or blob handle, connector-specific.
    pub path_or_blob: String,
    pub metadata: DocMetadata,
}

pub trait Connector: Send {
    fn source(&self) -> SourceKind;

    /// Enumerate the items currently visible to this connector.
    fn items(&mut self) -> Result<Vec<ConnectorItem>, ConnectorError>;

    /// Deposit the item as a readable local file and return its path.
    fn materialize(&mut self, item: &ConnectorItem) -> Result<PathBuf, ConnectorError>;
}
