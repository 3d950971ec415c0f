use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

/// The two logical storage areas a document can live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Documents of records that have not completed approval
    Active,
    /// Documents moved out after approval
    Archived,
}

impl Namespace {
    /// Probe order used when resolving a bare document name
    pub const RESOLUTION_ORDER: [Namespace; 2] = [Namespace::Archived, Namespace::Active];

    /// Path segment under which the blob store exposes this namespace
    pub fn path_segment(self) -> &'static str {
        match self {
            Namespace::Active => "subscription_files",
            Namespace::Archived => "cancelled_subscription_files",
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DocumentNameError {
    #[error("Document name is empty")]
    Empty,

    #[error("Document name '{0}' is not a valid file name")]
    Invalid(String),
}

/// A bare file name, the only key the document store understands.
///
/// Older records stored documents as paths such as `/subscription_files/a.pdf`;
/// only the last segment is kept so both forms address the same blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentName(String);

impl DocumentName {
    pub fn parse(raw: &str) -> Result<Self, DocumentNameError> {
        let trimmed = raw.trim();
        let name = trimmed.rsplit('/').next().unwrap_or(trimmed).trim();

        if name.is_empty() {
            return Err(DocumentNameError::Empty);
        }
        if name == "." || name == ".." || name.contains('\\') {
            return Err(DocumentNameError::Invalid(raw.to_string()));
        }

        Ok(Self(name.to_string()))
    }

    /// Name under which a freshly uploaded blob is stored, unique per owning record
    pub fn unique_for(owner_id: Uuid, original: &DocumentName) -> Self {
        Self(format!(
            "{}_{}_{}",
            owner_id.simple(),
            Uuid::new_v4().simple(),
            original.0
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentName {
    type Error = DocumentNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentName> for String {
    fn from(name: DocumentName) -> Self {
        name.0
    }
}

/// Splits a legacy comma-separated document column into names, dropping blanks
pub fn parse_document_list(raw: &str) -> Vec<DocumentName> {
    raw.split(',')
        .filter_map(|part| DocumentName::parse(part).ok())
        .collect()
}

/// A document handed to the cancellation workflow
#[derive(Debug, Clone)]
pub enum DocumentReference {
    /// Already persisted in the document store
    Existing { name: DocumentName },
    /// Local blob that still has to be uploaded
    New {
        name: DocumentName,
        content: Vec<u8>,
        content_type: Option<String>,
    },
}

impl DocumentReference {
    pub fn name(&self) -> &DocumentName {
        match self {
            DocumentReference::Existing { name } | DocumentReference::New { name, .. } => name,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, DocumentReference::Existing { .. })
    }
}

/// A document name together with the address a viewer should open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDocument {
    pub name: DocumentName,
    pub address: Url,
}
