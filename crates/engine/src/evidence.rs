//! Evidence storage capability.
//!
//! Object storage lives outside the engine; dispute flows consume it through
//! this trait. A failed upload aborts the whole append, so implementations
//! should only return once the object is durably stored.

use std::collections::HashMap;

use crate::{EvidenceRef, ResultEngine};

/// Payload handed to the store when a dispute event carries evidence.
#[derive(Clone, Debug)]
pub struct EvidenceUpload {
    /// Key prefix, typically `disputes/<case-id>`.
    pub prefix: String,
    pub file_name: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

impl EvidenceUpload {
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            prefix: String::new(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            body,
            metadata: HashMap::new(),
        }
    }
}

/// Location of a stored evidence object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEvidence {
    pub key: String,
    pub url: String,
}

/// External object store the dispute engine uploads evidence to.
#[async_trait::async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn store(&self, upload: EvidenceUpload) -> ResultEngine<StoredEvidence>;
}

impl StoredEvidence {
    pub(crate) fn into_ref(self, upload: &EvidenceUpload) -> EvidenceRef {
        EvidenceRef {
            key: self.key,
            url: self.url,
            file_name: upload.file_name.clone(),
            content_type: upload.content_type.clone(),
        }
    }
}
