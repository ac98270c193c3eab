// ABOUTME: The application-visible unit of data exchanged over every interaction model
// ABOUTME: Wraps optional metadata and a data byte sequence, mirroring the PAYLOAD frame body

use bytes::Bytes;

/// A single application message: optional metadata plus a (possibly empty) data body.
///
/// `metadata` being `None` is distinct from `Some(Bytes::new())` — an absent METADATA flag
/// on the wire versus a present-but-empty metadata section. See the frame codec's
/// zero-metadata-vs-empty-metadata round-trip property.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    pub metadata: Option<Bytes>,
    pub data: Bytes,
}

impl Payload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            metadata: None,
            data: data.into(),
        }
    }

    pub fn with_metadata(data: impl Into<Bytes>, metadata: impl Into<Bytes>) -> Self {
        Self {
            metadata: Some(metadata.into()),
            data: data.into(),
        }
    }

    pub fn metadata_only(metadata: impl Into<Bytes>) -> Self {
        Self {
            metadata: Some(metadata.into()),
            data: Bytes::new(),
        }
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn has_elements(&self) -> bool {
        !self.data.is_empty() || self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.metadata.is_none()
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::new(Bytes::from(s))
    }
}
