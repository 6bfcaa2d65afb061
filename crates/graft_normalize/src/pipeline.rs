//! The normalization pipeline.
//!
//! Both entry points run the same expansion pass; they differ only in what
//! happens to compressed-binding candidates. Full normalization collects
//! them and runs binding compression; the without-compression variant drops
//! them, which is what a caller wants when it already holds a normalized
//! parent component and only needs the delta.

use graft_component::{AllocatorRequirements, ComponentEntry, EntryKind, TypeId};

use crate::compress::{
    perform_binding_compression, CompressedBindingInfo, CompressedCandidateMap, CompressionUndoMap,
};
use crate::diagnostics::NormalizationError;
use crate::expand::expand_entries;
use crate::multibinding::MultibindingPairs;

/// Result of full normalization.
#[derive(Debug, PartialEq)]
pub struct NormalizedBindings {
    /// The flat, deduplicated, compression-optimized binding vector.
    pub bindings: Vec<ComponentEntry>,
    /// Multibinding pairs in arrival order, ready for aggregation.
    pub multibindings: MultibindingPairs,
    /// Undo records for every compression performed.
    pub undo: CompressionUndoMap,
}

/// Normalizes `toplevel_entries` into a flat binding vector, applying
/// binding compression.
///
/// `toplevel_component_fun_type_id` identifies the root component function
/// and appears only in diagnostics. `exposed_types` are the types named in
/// the root component's signature; they are never compressed away.
pub fn try_normalize(
    toplevel_entries: Vec<ComponentEntry>,
    allocator: &mut AllocatorRequirements,
    toplevel_component_fun_type_id: TypeId,
    exposed_types: &[TypeId],
) -> Result<NormalizedBindings, NormalizationError> {
    let mut candidates = CompressedCandidateMap::default();
    let mut pairs = MultibindingPairs::new();

    let binding_map = expand_entries(
        toplevel_entries,
        allocator,
        toplevel_component_fun_type_id,
        |entry| {
            let EntryKind::CompressedBinding { c_type_id, create } = entry.kind else {
                unreachable!("compressed-binding handler received a different kind");
            };
            candidates.insert(
                c_type_id,
                CompressedBindingInfo {
                    i_type_id: entry.type_id,
                    create_i_with_compression: create,
                },
            );
        },
        |contribution, creator| pairs.push((contribution, creator)),
    )?;

    let (bindings, undo) = perform_binding_compression(binding_map, candidates, &pairs, exposed_types);
    Ok(NormalizedBindings { bindings, multibindings: pairs, undo })
}

/// Normalizes `toplevel_entries` without binding compression; compressed
/// candidates are discarded.
pub fn try_normalize_without_compression(
    toplevel_entries: Vec<ComponentEntry>,
    allocator: &mut AllocatorRequirements,
    toplevel_component_fun_type_id: TypeId,
) -> Result<(Vec<ComponentEntry>, MultibindingPairs), NormalizationError> {
    let mut pairs = MultibindingPairs::new();

    let binding_map = expand_entries(
        toplevel_entries,
        allocator,
        toplevel_component_fun_type_id,
        |_entry| {},
        |contribution, creator| pairs.push((contribution, creator)),
    )?;

    Ok((binding_map.into_values().collect(), pairs))
}

/// Infallible shell over [`try_normalize`]: renders the diagnostic and
/// terminates the process on fatal misuse.
pub fn normalize(
    toplevel_entries: Vec<ComponentEntry>,
    allocator: &mut AllocatorRequirements,
    toplevel_component_fun_type_id: TypeId,
    exposed_types: &[TypeId],
) -> NormalizedBindings {
    match try_normalize(toplevel_entries, allocator, toplevel_component_fun_type_id, exposed_types)
    {
        Ok(normalized) => normalized,
        Err(error) => fatal(error),
    }
}

/// Infallible shell over [`try_normalize_without_compression`].
pub fn normalize_without_compression(
    toplevel_entries: Vec<ComponentEntry>,
    allocator: &mut AllocatorRequirements,
    toplevel_component_fun_type_id: TypeId,
) -> (Vec<ComponentEntry>, MultibindingPairs) {
    match try_normalize_without_compression(
        toplevel_entries,
        allocator,
        toplevel_component_fun_type_id,
    ) {
        Ok(outputs) => outputs,
        Err(error) => fatal(error),
    }
}

fn fatal(error: NormalizationError) -> ! {
    eprintln!("{error}");
    std::process::exit(1);
}
