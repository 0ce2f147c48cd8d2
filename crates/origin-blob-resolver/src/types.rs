//! Bot API wire types

use serde::Deserialize;

/// Response envelope of the `getFile` method
#[derive(Debug, Deserialize)]
pub struct GetFileResponse {
    pub ok: bool,
    pub result: Option<OriginFile>,
    pub description: Option<String>,
}

/// File descriptor returned by `getFile`
///
/// A local Bot API server returns an absolute disk path in `file_path`
/// once the file has been materialized on its disk.
#[derive(Debug, Deserialize)]
pub struct OriginFile {
    pub file_id: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<u64>,
}

impl GetFileResponse {
    /// The reported file path, if the call succeeded and returned one
    pub fn file_path(&self) -> Option<&str> {
        if !self.ok {
            return None;
        }
        self.result
            .as_ref()
            .and_then(|r| r.file_path.as_deref())
            .filter(|p| !p.is_empty())
    }
}
