pub mod delta;
pub mod export;
pub mod fields;
pub mod flatten;
pub mod matcher;
pub mod resolve;
pub mod section_diff;
pub mod shape;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("unsupported entity kind {0}")]
        UnsupportedEntityKind(String),
        #[error("conversion of entity {handle} failed: {reason}")]
        Conversion { handle: String, reason: String },
        #[error(
            "entity {handle} resolves to {before} geometries before and {after} after; cannot pair them"
        )]
        MalformedPairing {
            handle: String,
            before: usize,
            after: usize,
        },
    }
}

pub use delta::{DeltaKind, DeltaOptions, EntityDelta, entity_differences};
pub use errors::EngineError;
pub use resolve::{FallbackCase, FallbackToggles, Origin, ResolveOptions, Resolved, Resolver};
pub use section_diff::{SectionDiff, document_differences, raw_differences, section_difference};
