//! Binding compression.
//!
//! A candidate pair `I -> C` (an interface bound to its single
//! implementation) can be collapsed into one binding that constructs `C`
//! directly and hands it out as `I`, saving one allocation hop. A candidate
//! survives only while `C` stays a pure implementation detail of `I`: not
//! exposed, not a dependency of any multibinding, and not a dependency of
//! any other bound type.

use graft_component::{ComponentEntry, ConstructBinding, CreateFn, EntryKind, TypeId};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::expand::BindingMap;

/// Candidate recorded from a compressed-binding entry, keyed by `C`.
#[derive(Debug, Clone, Copy)]
pub struct CompressedBindingInfo {
    pub i_type_id: TypeId,
    /// Creation routine that constructs `C` directly when asked for `I`.
    pub create_i_with_compression: CreateFn,
}

/// Candidate compressions, keyed by the implementation type `C`.
pub type CompressedCandidateMap = FxHashMap<TypeId, CompressedBindingInfo>;

/// Everything needed to reverse one collapse, keyed by `C`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionUndoInfo {
    pub i_type_id: TypeId,
    /// The interface binding as it was before the collapse.
    pub i_binding: ConstructBinding,
    /// The implementation binding that was removed.
    pub c_binding: ConstructBinding,
}

/// Undo records for every collapse performed, keyed by `C`.
pub type CompressionUndoMap = FxHashMap<TypeId, CompressionUndoInfo>;

/// Prunes the candidate map, applies every surviving collapse in place, and
/// flattens the binding map into the final vector.
///
/// The implementation side of a candidate is always constructor- or
/// provider-bound, never an interface binding itself, so collapsed chains
/// `I -> C -> X` cannot arise and need no pruning step of their own.
pub fn perform_binding_compression(
    mut binding_map: BindingMap,
    mut candidates: CompressedCandidateMap,
    multibindings: &[(ComponentEntry, ComponentEntry)],
    exposed_types: &[TypeId],
) -> (Vec<ComponentEntry>, CompressionUndoMap) {
    // A type some multibinding needs must stay bound under its own name.
    for (contribution, _creator) in multibindings {
        let deps = match &contribution.kind {
            EntryKind::MultibindingNeedsAllocation(binding)
            | EntryKind::MultibindingNeedsNoAllocation(binding) => &binding.deps,
            EntryKind::MultibindingConstructedObject { .. } => continue,
            _ => unreachable!("multibinding list holds only contribution entries"),
        };
        for dep in deps.iter() {
            if candidates.remove(dep).is_some() {
                debug!(ty = %dep, "skipping compression: type is a dependency of a multibinding");
            }
        }
    }

    // An exposed type is observable by external code (its interface usually
    // is the exposed one instead).
    for type_id in exposed_types {
        if candidates.remove(type_id).is_some() {
            debug!(ty = %type_id, "skipping compression: type is exposed");
        }
    }

    // Any consumer other than the interface forces the implementation to
    // remain a first-class binding.
    for (x_type_id, entry) in &binding_map {
        let deps = match &entry.kind {
            EntryKind::NeedsAllocation(binding) | EntryKind::NeedsNoAllocation(binding) => {
                &binding.deps
            }
            EntryKind::ConstructedObject { .. } => continue,
            _ => unreachable!("binding map holds only direct bindings"),
        };
        for dep in deps.iter() {
            if let Some(info) = candidates.get(dep) {
                if info.i_type_id != *x_type_id {
                    candidates.remove(dep);
                    debug!(ty = %dep, consumer = %x_type_id, "skipping compression: another binding depends on it");
                }
            }
        }
    }

    let mut undo_map = CompressionUndoMap::default();
    for (c_type_id, info) in candidates {
        let i_type_id = info.i_type_id;
        let Some(c_entry) = binding_map.remove(&c_type_id) else {
            unreachable!("compressed implementation {c_type_id} has no binding");
        };
        let Some(i_entry) = binding_map.get_mut(&i_type_id) else {
            unreachable!("compressed interface {i_type_id} has no binding");
        };
        let EntryKind::NeedsNoAllocation(i_binding) = &i_entry.kind else {
            unreachable!("interface side of a compressed pair is always provider-bound");
        };

        // The implementation keeps its allocation behavior; only the name it
        // is stored under changes.
        let (c_needs_allocation, c_binding) = match c_entry.kind {
            EntryKind::NeedsAllocation(binding) => (true, binding),
            EntryKind::NeedsNoAllocation(binding) => (false, binding),
            _ => unreachable!("implementation side of a compressed pair is always to-construct"),
        };

        undo_map.insert(
            c_type_id,
            CompressionUndoInfo {
                i_type_id,
                i_binding: i_binding.clone(),
                c_binding: c_binding.clone(),
            },
        );

        let collapsed = ConstructBinding {
            create: info.create_i_with_compression,
            deps: c_binding.deps,
        };
        i_entry.kind = if c_needs_allocation {
            EntryKind::NeedsAllocation(collapsed)
        } else {
            EntryKind::NeedsNoAllocation(collapsed)
        };
        debug!(interface = %i_type_id, implementation = %c_type_id, "performed binding compression");
    }

    (binding_map.into_values().collect(), undo_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_component::{AllocatorRequirements, DependencyList, VectorCreatorFn};
    use crate::expand::expand_entries;

    struct Root;
    struct Api;
    struct ApiImpl;
    struct Consumer;
    struct Hook;

    fn make_api(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn make_impl(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn make_api_compressed(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn make_consumer(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn hook_vector(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn compressible_entries() -> Vec<ComponentEntry> {
        vec![
            ComponentEntry::needs_no_allocation(
                TypeId::of::<Api>(),
                CreateFn::new(make_api),
                DependencyList::from(vec![TypeId::of::<ApiImpl>()]),
            ),
            ComponentEntry::needs_allocation(
                TypeId::of::<ApiImpl>(),
                CreateFn::new(make_impl),
                DependencyList::empty(),
            ),
            ComponentEntry::compressed_binding(
                TypeId::of::<Api>(),
                TypeId::of::<ApiImpl>(),
                CreateFn::new(make_api_compressed),
            ),
        ]
    }

    fn run(
        entries: Vec<ComponentEntry>,
        exposed: &[TypeId],
    ) -> (Vec<ComponentEntry>, CompressionUndoMap) {
        let mut allocator = AllocatorRequirements::new();
        let mut candidates = CompressedCandidateMap::default();
        let mut pairs = Vec::new();
        let map = expand_entries(
            entries,
            &mut allocator,
            TypeId::of::<Root>(),
            |entry| {
                let EntryKind::CompressedBinding { c_type_id, create } = entry.kind else {
                    panic!("handler received a non-compressed entry");
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
        )
        .unwrap();
        perform_binding_compression(map, candidates, &pairs, exposed)
    }

    #[test]
    fn eligible_pair_is_collapsed() {
        let (bindings, undo) = run(compressible_entries(), &[]);

        assert_eq!(bindings.len(), 1);
        let collapsed = &bindings[0];
        assert_eq!(collapsed.type_id, TypeId::of::<Api>());
        let EntryKind::NeedsAllocation(binding) = &collapsed.kind else {
            panic!("collapsed binding must inherit the implementation's kind");
        };
        assert_eq!(binding.create, CreateFn::new(make_api_compressed));
        assert!(binding.deps.is_empty());

        let info = &undo[&TypeId::of::<ApiImpl>()];
        assert_eq!(info.i_type_id, TypeId::of::<Api>());
        assert_eq!(info.i_binding.create, CreateFn::new(make_api));
        assert_eq!(info.c_binding.create, CreateFn::new(make_impl));
    }

    #[test]
    fn exposed_implementation_is_not_collapsed() {
        let (bindings, undo) = run(compressible_entries(), &[TypeId::of::<ApiImpl>()]);
        assert_eq!(bindings.len(), 2);
        assert!(undo.is_empty());
    }

    #[test]
    fn foreign_consumer_keeps_the_implementation_bound() {
        let mut entries = compressible_entries();
        entries.push(ComponentEntry::needs_allocation(
            TypeId::of::<Consumer>(),
            CreateFn::new(make_consumer),
            DependencyList::from(vec![TypeId::of::<ApiImpl>()]),
        ));
        let (bindings, undo) = run(entries, &[]);
        assert_eq!(bindings.len(), 3);
        assert!(undo.is_empty());
    }

    #[test]
    fn multibinding_dependency_keeps_the_implementation_bound() {
        let mut entries = compressible_entries();
        entries.push(ComponentEntry::multibinding_needs_allocation(
            TypeId::of::<Hook>(),
            CreateFn::new(make_consumer),
            DependencyList::from(vec![TypeId::of::<ApiImpl>()]),
        ));
        entries.push(ComponentEntry::multibinding_vector_creator(
            TypeId::of::<Hook>(),
            VectorCreatorFn::new(hook_vector),
        ));
        let (bindings, undo) = run(entries, &[]);
        assert_eq!(bindings.len(), 2);
        assert!(undo.is_empty());
    }

    #[test]
    fn constructed_multibinding_contribution_does_not_veto() {
        static HOOK: u8 = 0;
        let mut entries = compressible_entries();
        entries.push(ComponentEntry::multibinding_constructed_object(
            TypeId::of::<Hook>(),
            graft_component::ObjectPtr::from_ref(&HOOK),
        ));
        entries.push(ComponentEntry::multibinding_vector_creator(
            TypeId::of::<Hook>(),
            VectorCreatorFn::new(hook_vector),
        ));
        let (bindings, undo) = run(entries, &[]);
        assert_eq!(bindings.len(), 1);
        assert_eq!(undo.len(), 1);
    }
}
