//! Content types carried by artifact versions, and the codec boundary
//! between an artifact's opaque stored encoding and its typed in-memory
//! representation.
//!
//! Every artifact version stores its content as an opaque string (per the
//! data model); the string is produced and consumed exclusively by the
//! [`crate::internal::agents::Agent`] registered for the artifact's type
//! tag. This module defines the four built-in content types: [`Baseline`],
//! [`Directory`], [`Text`], and [`Binary`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::id::Id;

/// Encode/decode helpers shared by every content type: the opaque string
/// stored on an [`crate::internal::artifact::ArtifactVersion`] is always
/// this type's canonical JSON rendering.
macro_rules! json_codec {
    ($ty:ty) => {
        impl $ty {
            pub fn encode(&self) -> Result<String> {
                Ok(serde_json::to_string(self)?)
            }

            pub fn decode(s: &str) -> Result<Self> {
                Ok(serde_json::from_str(s)?)
            }
        }
    };
}

/// Type tag used for baseline artifacts.
pub const BASELINE_TYPE: &str = "baseline";
/// Type tag used for directory artifacts.
pub const DIRECTORY_TYPE: &str = "directory";
/// Type tag used for text artifacts.
pub const TEXT_TYPE: &str = "text";
/// Type tag used for binary artifacts.
pub const BINARY_TYPE: &str = "binary";

/// Content of a `baseline`-typed artifact: a named project snapshot.
///
/// `versions` is keyed by artifact ID and covers exactly the artifacts
/// transitively reachable from `root_directory` under this baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub root_directory: Id,
    /// Artifact ID -> version ID. A `BTreeMap` keeps JSON encoding and diff
    /// output deterministic, which the merge agents' conflict-ordering
    /// tests rely on.
    pub versions: BTreeMap<Id, Id>,
}

impl Baseline {
    pub fn new(root_directory: Id) -> Self {
        Baseline { root_directory, versions: BTreeMap::new() }
    }
}

json_codec!(Baseline);

/// One name -> artifact binding inside a [`Directory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub artifact_id: Id,
}

/// Content of a `directory`-typed artifact: an ordered list of name->artifact
/// bindings. Names are unique within a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Directory {
    pub entries: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Directory::default()
    }

    pub fn get(&self, name: &str) -> Option<&Id> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.artifact_id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace the binding for `name`. Returns the previous
    /// artifact ID bound to that name, if any.
    pub fn set(&mut self, name: &str, artifact_id: Id) -> Option<Id> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            Some(std::mem::replace(&mut entry.artifact_id, artifact_id))
        } else {
            self.entries.push(DirectoryEntry { name: name.to_string(), artifact_id });
            None
        }
    }

    /// Remove the binding for `name`, returning the artifact ID it pointed at.
    pub fn remove(&mut self, name: &str) -> Option<Id> {
        let idx = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(idx).artifact_id)
    }
}

json_codec!(Directory);

/// Content of a `text`-typed artifact: an ordered sequence of lines,
/// preserving trailing newlines verbatim (a line is everything up to and
/// including its `\n`, except possibly the final line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Text {
    pub lines: Vec<String>,
}

impl Text {
    pub fn new(lines: Vec<String>) -> Self {
        Text { lines }
    }

    /// Split `content` into lines the way [`Text`] stores them: each
    /// element keeps its trailing `\n` except possibly the last.
    pub fn from_content(content: &str) -> Self {
        if content.is_empty() {
            return Text::default();
        }
        let mut lines = Vec::new();
        let mut start = 0;
        let bytes = content.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'\n' {
                lines.push(content[start..=i].to_string());
                start = i + 1;
            }
        }
        if start < content.len() {
            lines.push(content[start..].to_string());
        }
        Text { lines }
    }

    pub fn to_content(&self) -> String {
        self.lines.concat()
    }
}

json_codec!(Text);

/// Content of a `binary`-typed artifact: an opaque byte array, base64-coded
/// when embedded in JSON. Binary artifacts never merge; see
/// [`crate::internal::agents::binary::BinaryAgent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Binary {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Binary {
    pub fn new(data: Vec<u8>) -> Self {
        Binary { data }
    }
}

json_codec!(Binary);

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).map_err(serde::de::Error::custom)
    }

    fn encode(data: &[u8]) -> String {
        let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
        for chunk in data.chunks(3) {
            let b0 = chunk[0];
            let b1 = *chunk.get(1).unwrap_or(&0);
            let b2 = *chunk.get(2).unwrap_or(&0);
            out.push(TABLE[(b0 >> 2) as usize] as char);
            out.push(TABLE[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
            out.push(if chunk.len() > 1 { TABLE[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char } else { '=' });
            out.push(if chunk.len() > 2 { TABLE[(b2 & 0x3f) as usize] as char } else { '=' });
        }
        out
    }

    fn decode(s: &str) -> Result<Vec<u8>, String> {
        fn value(c: u8) -> Option<u8> {
            TABLE.iter().position(|&t| t == c).map(|p| p as u8)
        }
        let s = s.trim_end_matches('=');
        let mut out = Vec::new();
        let chars: Vec<u8> = s.bytes().collect();
        for chunk in chars.chunks(4) {
            let vals: Vec<u8> = chunk.iter().map(|&c| value(c).ok_or_else(|| "invalid base64 byte".to_string())).collect::<Result<_, _>>()?;
            if vals.len() >= 2 {
                out.push((vals[0] << 2) | (vals[1] >> 4));
            }
            if vals.len() >= 3 {
                out.push((vals[1] << 4) | (vals[2] >> 2));
            }
            if vals.len() == 4 {
                out.push((vals[2] << 6) | vals[3]);
            }
        }
        Ok(out)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_splits_preserving_trailing_newlines() {
        let text = Text::from_content("a\nb\nc");
        assert_eq!(text.lines, vec!["a\n", "b\n", "c"]);
        assert_eq!(text.to_content(), "a\nb\nc");
    }

    #[test]
    fn text_round_trips_empty_content() {
        let text = Text::from_content("");
        assert!(text.lines.is_empty());
        assert_eq!(text.to_content(), "");
    }

    #[test]
    fn directory_set_get_remove() {
        let mut dir = Directory::new();
        let id = Id::new(crate::id::Kind::Artifact);
        assert!(dir.set("a", id.clone()).is_none());
        assert_eq!(dir.get("a"), Some(&id));
        assert_eq!(dir.remove("a"), Some(id));
        assert!(!dir.contains("a"));
    }
}
