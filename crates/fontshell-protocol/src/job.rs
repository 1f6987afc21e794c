// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compile job payloads carried across the worker boundary.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Source extensions the editor exports to `.babelfont` before compiling.
const SOURCE_EXTENSIONS: &[&str] = &["babelfont", "glyphs", "ufo", "designspace"];

/// A request to compile one exported font.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileJob {
    /// The font serialized in `.babelfont` JSON form.
    pub babelfont_json: String,
    /// Name of the source file the font was loaded from.
    pub filename: String,
}

impl CompileJob {
    pub fn new(babelfont_json: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            babelfont_json: babelfont_json.into(),
            filename: filename.into(),
        }
    }

    /// Name of the binary the job produces, e.g. `MyFont.glyphs` -> `MyFont.ttf`.
    pub fn output_filename(&self) -> String {
        let path = Path::new(&self.filename);
        let stem = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if SOURCE_EXTENSIONS.contains(&ext) => path.file_stem(),
            _ => path.file_name(),
        };

        match stem.and_then(|s| s.to_str()).filter(|s| !s.is_empty()) {
            Some(stem) => format!("{stem}.ttf"),
            None => "font.ttf".to_string(),
        }
    }
}

/// Compiled font binary returned by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFont {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl CompiledFont {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
