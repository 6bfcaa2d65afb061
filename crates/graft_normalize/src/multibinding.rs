//! Multibinding aggregation.
//!
//! Expansion leaves multibindings as a flat list of (contribution, vector
//! creator) pairs; this pass merges them into one ordered set per type. A
//! set is a multiset: duplicate contributions are kept, and their order is
//! arrival order.

use graft_component::{AllocatorRequirements, ComponentEntry, CreateFn, EntryKind, ObjectPtr, TypeId, VectorCreatorFn};
use rustc_hash::FxHashMap;
use tracing::trace;

/// (contribution, vector creator) pairs in arrival order.
pub type MultibindingPairs = Vec<(ComponentEntry, ComponentEntry)>;

/// One element of an aggregated multibinding set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedMultibinding {
    /// The instance already exists.
    Constructed { object: ObjectPtr },
    /// The instance is created on first use.
    ToConstruct { create: CreateFn },
}

/// Aggregated contributions for one multibinding type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMultibindingSet {
    /// Materializes the aggregated vector. Every pair for the same type
    /// carries a semantically equal creator, so overwriting is harmless.
    pub get_vector: VectorCreatorFn,
    pub elems: Vec<NormalizedMultibinding>,
}

/// Aggregated multibinding sets, keyed by the contributed type.
pub type NormalizedMultibindingMap = FxHashMap<TypeId, NormalizedMultibindingSet>;

/// Merges `pairs` into `multibindings`, reserving allocator space for every
/// to-construct contribution.
pub fn add_multibindings(
    multibindings: &mut NormalizedMultibindingMap,
    allocator: &mut AllocatorRequirements,
    pairs: MultibindingPairs,
) {
    for (contribution, creator) in pairs {
        let EntryKind::MultibindingVectorCreator { get_vector } = creator.kind else {
            unreachable!("multibinding pair carries a non-creator second entry");
        };
        trace!(ty = %contribution.type_id, "aggregating multibinding contribution");

        let set = multibindings
            .entry(contribution.type_id)
            .or_insert_with(|| NormalizedMultibindingSet { get_vector, elems: Vec::new() });
        set.get_vector = get_vector;

        match contribution.kind {
            EntryKind::MultibindingConstructedObject { object } => {
                set.elems.push(NormalizedMultibinding::Constructed { object });
            }
            EntryKind::MultibindingNeedsAllocation(binding) => {
                allocator.add_type(contribution.type_id);
                set.elems.push(NormalizedMultibinding::ToConstruct { create: binding.create });
            }
            EntryKind::MultibindingNeedsNoAllocation(binding) => {
                allocator.add_externally_allocated_type(contribution.type_id);
                set.elems.push(NormalizedMultibinding::ToConstruct { create: binding.create });
            }
            _ => unreachable!("multibinding pair carries a non-contribution first entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_component::DependencyList;

    struct Listener;
    struct Filter;

    fn make_listener(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn make_filter(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn listener_vector(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn filter_vector(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn creator_for(type_id: TypeId, f: graft_component::entry::RawErasedFn) -> ComponentEntry {
        ComponentEntry::multibinding_vector_creator(type_id, VectorCreatorFn::new(f))
    }

    #[test]
    fn contributions_group_by_type_in_arrival_order() {
        static PREBUILT: u8 = 0;
        let listener = TypeId::of::<Listener>();
        let filter = TypeId::of::<Filter>();
        let pairs = vec![
            (
                ComponentEntry::multibinding_needs_allocation(
                    listener,
                    CreateFn::new(make_listener),
                    DependencyList::empty(),
                ),
                creator_for(listener, listener_vector),
            ),
            (
                ComponentEntry::multibinding_constructed_object(
                    listener,
                    ObjectPtr::from_ref(&PREBUILT),
                ),
                creator_for(listener, listener_vector),
            ),
            (
                ComponentEntry::multibinding_needs_no_allocation(
                    filter,
                    CreateFn::new(make_filter),
                    DependencyList::empty(),
                ),
                creator_for(filter, filter_vector),
            ),
        ];

        let mut sets = NormalizedMultibindingMap::default();
        let mut allocator = AllocatorRequirements::new();
        add_multibindings(&mut sets, &mut allocator, pairs);

        assert_eq!(sets.len(), 2);
        let listener_set = &sets[&listener];
        assert_eq!(listener_set.get_vector, VectorCreatorFn::new(listener_vector));
        assert_eq!(
            listener_set.elems,
            vec![
                NormalizedMultibinding::ToConstruct { create: CreateFn::new(make_listener) },
                NormalizedMultibinding::Constructed { object: ObjectPtr::from_ref(&PREBUILT) },
            ]
        );

        assert_eq!(allocator.owned_types(), [listener]);
        assert_eq!(allocator.externally_allocated_types(), [filter]);
    }

    #[test]
    fn duplicate_contributions_are_kept() {
        let listener = TypeId::of::<Listener>();
        let contribution = ComponentEntry::multibinding_needs_allocation(
            listener,
            CreateFn::new(make_listener),
            DependencyList::empty(),
        );
        let pairs = vec![
            (contribution.clone(), creator_for(listener, listener_vector)),
            (contribution, creator_for(listener, listener_vector)),
        ];

        let mut sets = NormalizedMultibindingMap::default();
        let mut allocator = AllocatorRequirements::new();
        add_multibindings(&mut sets, &mut allocator, pairs);

        assert_eq!(sets[&listener].elems.len(), 2);
        assert_eq!(allocator.owned_types(), [listener, listener]);
    }
}
