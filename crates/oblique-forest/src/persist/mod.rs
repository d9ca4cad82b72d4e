//! Native JSON persistence for [`ObliqueForest`].
//!
//! A saved model is a versioned envelope around schema types (see
//! [`schema`]) that mirror the runtime types without sharing them. Loading
//! checks the version, then converts with full validation; a malformed
//! document is rejected, never truncated or padded.
//!
//! ```no_run
//! use oblique_forest::model::ObliqueForest;
//!
//! let model = ObliqueForest::load_json("forest.json").unwrap();
//! model.save_json("copy.json").unwrap();
//! ```

mod convert;
mod error;
pub mod schema;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde_json::Value;

use crate::model::ObliqueForest;

pub use error::{ReadError, WriteError};
pub use schema::FORMAT_VERSION;

use schema::{ModelEnvelope, ObliqueForestSchema};

impl ObliqueForest {
    /// Write the model as JSON.
    pub fn to_json_writer<W: Write>(&self, writer: W) -> Result<(), WriteError> {
        serde_json::to_writer(writer, &self.envelope())?;
        Ok(())
    }

    /// Serialize the model to a JSON string.
    pub fn to_json_string(&self) -> Result<String, WriteError> {
        Ok(serde_json::to_string(&self.envelope())?)
    }

    fn envelope(&self) -> ModelEnvelope {
        ModelEnvelope {
            format_version: FORMAT_VERSION,
            model: ObliqueForestSchema::from(self),
        }
    }

    /// Read a model from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::UnsupportedVersion`] for documents from another
    /// format version and [`ReadError::Validation`] for inconsistent ones.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ReadError> {
        let value: Value = serde_json::from_reader(reader)?;
        let version = value
            .get("format_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| ReadError::Validation("missing format_version".into()))?;
        if version != FORMAT_VERSION {
            return Err(ReadError::UnsupportedVersion(version));
        }
        let envelope: ModelEnvelope = serde_json::from_value(value)?;
        ObliqueForest::try_from(envelope.model)
    }

    /// Save to a JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), WriteError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_json_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Load from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        Self::from_json_reader(BufReader::new(File::open(path)?))
    }
}
