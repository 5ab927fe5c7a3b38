//! Human-facing parameter metadata.
//!
//! The wire protocol carries only name, value and type; descriptions, units
//! and range limits come from an out-of-band catalog the embedding
//! application supplies.

use serde::{Deserialize, Serialize};

/// Descriptive annotations for one named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamMetadata {
    pub display_name: String,
    pub description: String,
    pub units: Option<String>,
    pub lower: Option<f32>,
    pub upper: Option<f32>,
}

/// Catalog lookup by parameter name. Absence is normal; vehicles routinely
/// carry parameters the catalog has never heard of.
pub trait ParamMetadataSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<ParamMetadata>;
}

/// A source that knows nothing. The default when no catalog is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetadata;

impl ParamMetadataSource for NullMetadata {
    fn lookup(&self, _name: &str) -> Option<ParamMetadata> {
        None
    }
}
