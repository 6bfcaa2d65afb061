//! graft_normalize - binding normalization engine for the graft injection toolkit.
//!
//! The codegen layer hands the injector a raw, tree-shaped stream of
//! component entries; this crate compiles that stream into a flat,
//! deduplicated, compression-optimized binding table. The pipeline has three
//! stages: lazy component expansion (with duplicate unification and
//! installation-loop detection), binding compression, and multibinding
//! aggregation. Normalization is single-threaded, deterministic, and runs to
//! completion once per injector construction.

pub mod compress;
pub mod diagnostics;
pub mod expand;
pub mod multibinding;
pub mod pipeline;
pub mod storage;

pub use compress::{
    perform_binding_compression, CompressedBindingInfo, CompressedCandidateMap,
    CompressionUndoInfo, CompressionUndoMap,
};
pub use diagnostics::{InstallationTrace, NormalizationError, TraceFrame};
pub use expand::BindingMap;
pub use multibinding::{
    add_multibindings, MultibindingPairs, NormalizedMultibinding, NormalizedMultibindingMap,
    NormalizedMultibindingSet,
};
pub use pipeline::{
    normalize, normalize_without_compression, try_normalize, try_normalize_without_compression,
    NormalizedBindings,
};
pub use storage::NormalizedComponentStorage;
