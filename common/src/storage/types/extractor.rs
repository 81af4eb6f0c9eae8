use crate::{stored_object, utils::short_id};

use super::document::DocumentRef;

/// Id seed for extractors, kept apart from both document seeds.
pub const EXTRACTOR_SEED: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    Active,
    Expired,
}

stored_object!(Extractor, "extractor", {
    name: String,
    description: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    expiry: DateTime<Utc>,
    #[serde(default)]
    documents: Vec<DocumentRef>,
    #[serde(default)]
    census: Vec<String>
});

impl Extractor {
    /// A fresh record expiring `ttl` from now, saturating at the latest
    /// representable instant.
    pub fn new(name: String, description: String, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: short_id::generate(EXTRACTOR_SEED),
            created_at: now,
            updated_at: now,
            name,
            description,
            expiry: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            documents: Vec::new(),
            census: Vec::new(),
        }
    }

    /// An extractor is expired strictly after its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> ExtractorState {
        if self.is_expired_at(now) {
            ExtractorState::Expired
        } else {
            ExtractorState::Active
        }
    }

    pub fn find_document(&self, doc_type: &str, doc_id: &str) -> Option<&DocumentRef> {
        self.documents
            .iter()
            .find(|doc| doc.id == doc_id && doc.doc_type == doc_type)
    }
}
