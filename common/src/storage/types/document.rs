use serde::{Deserialize, Serialize};

use crate::utils::short_id;

/// Id seed for documents filed under the RFP category.
pub const RFP_DOCUMENT_SEED: u32 = 4;
/// Id seed for documents filed under any other category (census and friends).
pub const OTHER_DOCUMENT_SEED: u32 = 3;

const RFP_DOC_TYPE: &str = "RFP";

/// Reference from an extractor record to one uploaded blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: String,
    pub path: String,
    pub doc_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCategory {
    Rfp,
    Other,
}

impl DocumentCategory {
    pub fn from_doc_type(doc_type: &str) -> Self {
        if doc_type == RFP_DOC_TYPE {
            Self::Rfp
        } else {
            Self::Other
        }
    }

    pub fn id_seed(self) -> u32 {
        match self {
            Self::Rfp => RFP_DOCUMENT_SEED,
            Self::Other => OTHER_DOCUMENT_SEED,
        }
    }
}

impl DocumentRef {
    pub fn new(doc_type: &str, path: String) -> Self {
        let seed = DocumentCategory::from_doc_type(doc_type).id_seed();
        Self {
            id: short_id::generate(seed),
            path,
            doc_type: doc_type.to_string(),
        }
    }

    /// Last path segment, i.e. the collision-resolved file name.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or(self.path.as_str(), |(_, name)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_use_distinct_seeds() {
        assert_eq!(DocumentCategory::from_doc_type("RFP"), DocumentCategory::Rfp);
        assert_eq!(
            DocumentCategory::from_doc_type("census"),
            DocumentCategory::Other
        );
        assert_ne!(
            DocumentCategory::Rfp.id_seed(),
            DocumentCategory::Other.id_seed()
        );
    }

    #[test]
    fn rfp_and_census_ids_lead_with_different_characters() {
        for _ in 0..500 {
            let rfp = DocumentRef::new("RFP", "extractors/e/RFP/a.pdf".into());
            let census = DocumentRef::new("census", "extractors/e/census/a.csv".into());
            assert_ne!(rfp.id.chars().next(), census.id.chars().next());
        }
    }

    #[test]
    fn file_name_is_last_segment() {
        let doc = DocumentRef::new("RFP", "extractors/e/RFP/report-copy(1).pdf".into());
        assert_eq!(doc.file_name(), "report-copy(1).pdf");

        let bare = DocumentRef::new("RFP", "report.pdf".into());
        assert_eq!(bare.file_name(), "report.pdf");
    }
}
