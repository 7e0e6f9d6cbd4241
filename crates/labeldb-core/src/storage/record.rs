//! Row records as stored in the data tree.
//!
//! A record is one layout byte followed by the rkyv archive of the row's
//! values in table column order.

use crate::error::Error;
use crate::value::Value;
use rkyv::{Archive, Deserialize, Serialize};

/// Current record layout.
const LAYOUT_V1: u8 = 1;

/// A stored row.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Column values in table column order.
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Encode the record.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let archived = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(archived.len() + 1);
        bytes.push(LAYOUT_V1);
        bytes.extend_from_slice(&archived);
        Ok(bytes)
    }

    /// Decode a record.
    ///
    /// sled hands out buffers without alignment guarantees, so the archive is
    /// copied into an aligned buffer before validation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes.split_first() {
            Some((&LAYOUT_V1, archive)) => {
                let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(archive.len());
                aligned.extend_from_slice(archive);
                rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
                    .map_err(|e| Error::Deserialization(e.to_string()))
            }
            Some((layout, _)) => Err(Error::Deserialization(format!(
                "unknown record layout {}",
                layout
            ))),
            None => Err(Error::Deserialization("empty record".to_string())),
        }
    }
}
