use serde::{Deserialize, Deserializer};
use std::fmt;

/// Opaque continuation token issued by a paginated listing.
///
/// Only non-empty tokens are ever constructed: an empty or missing
/// `nextPageToken` means the listing is exhausted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(PageToken(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deserializes `nextPageToken`, mapping both `null` and `""` to `None`.
pub fn deserialize_next_token<'de, D>(deserializer: D) -> Result<Option<PageToken>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(PageToken::new))
}
