//! The owner of normalization outputs.

use graft_component::{AllocatorRequirements, ComponentEntry, EntryKind, TypeId};

use crate::compress::CompressionUndoMap;
use crate::diagnostics::NormalizationError;
use crate::multibinding::{add_multibindings, NormalizedMultibindingMap, NormalizedMultibindingSet};
use crate::pipeline::try_normalize;

/// Fully normalized component data, as handed to the injector: the flat
/// binding vector, the aggregated multibinding sets, the compression undo
/// records, and the storage plan the allocator was given.
#[derive(Debug)]
pub struct NormalizedComponentStorage {
    bindings: Vec<ComponentEntry>,
    multibindings: NormalizedMultibindingMap,
    undo: CompressionUndoMap,
    allocator: AllocatorRequirements,
}

impl NormalizedComponentStorage {
    /// Runs the full pipeline over `toplevel_entries`.
    pub fn new(
        toplevel_entries: Vec<ComponentEntry>,
        toplevel_component_fun_type_id: TypeId,
        exposed_types: &[TypeId],
    ) -> Result<Self, NormalizationError> {
        let mut allocator = AllocatorRequirements::new();
        let normalized = try_normalize(
            toplevel_entries,
            &mut allocator,
            toplevel_component_fun_type_id,
            exposed_types,
        )?;

        let mut multibindings = NormalizedMultibindingMap::default();
        add_multibindings(&mut multibindings, &mut allocator, normalized.multibindings);

        Ok(NormalizedComponentStorage {
            bindings: normalized.bindings,
            multibindings,
            undo: normalized.undo,
            allocator,
        })
    }

    pub fn bindings(&self) -> &[ComponentEntry] {
        &self.bindings
    }

    pub fn multibindings(&self) -> &NormalizedMultibindingMap {
        &self.multibindings
    }

    pub fn multibinding_set(&self, type_id: TypeId) -> Option<&NormalizedMultibindingSet> {
        self.multibindings.get(&type_id)
    }

    pub fn allocator_requirements(&self) -> &AllocatorRequirements {
        &self.allocator
    }

    /// Whether `type_id` was compressed away and can be re-exposed.
    pub fn is_compressed(&self, type_id: TypeId) -> bool {
        self.undo.contains_key(&type_id)
    }

    /// Reverses the compression that removed `c_type_id`, reinstating the
    /// implementation binding and restoring the interface binding to its
    /// pre-compression payload. Returns `false` when no such compression was
    /// performed.
    ///
    /// The implementation's original kind was inherited by the collapsed
    /// interface binding, so it is recovered from there.
    pub fn undo_compression(&mut self, c_type_id: TypeId) -> bool {
        let Some(info) = self.undo.remove(&c_type_id) else {
            return false;
        };

        let i_entry = self
            .bindings
            .iter_mut()
            .find(|entry| entry.type_id == info.i_type_id)
            .unwrap_or_else(|| {
                unreachable!("compressed interface {} has no binding", info.i_type_id)
            });

        let restored_c_kind = match &i_entry.kind {
            EntryKind::NeedsAllocation(_) => EntryKind::NeedsAllocation(info.c_binding),
            EntryKind::NeedsNoAllocation(_) => EntryKind::NeedsNoAllocation(info.c_binding),
            _ => unreachable!("collapsed interface binding is always to-construct"),
        };

        i_entry.kind = EntryKind::NeedsNoAllocation(info.i_binding);
        self.bindings.push(ComponentEntry { type_id: c_type_id, kind: restored_c_kind });
        true
    }
}
