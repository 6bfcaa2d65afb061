//! Lazy component expansion.
//!
//! A single pass over an explicit LIFO work stack turns the tree of top-level
//! entries and deferred sub-components into a flat binding map. Three
//! concerns interleave on the one stack: expansion of lazy components,
//! unification of duplicate bindings, and detection of installation loops.
//!
//! When a lazy component starts expanding, its stack slot is replaced by the
//! matching end-marker entry and the component's bindings are pushed above
//! it. By the time the marker surfaces again, everything the component
//! contributed has been processed, so the marker pop is exactly the point
//! where the expansion completes. Membership of the in-progress sets is what
//! makes loop detection O(1) per entry.

use std::collections::hash_map::Entry as MapEntry;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use graft_component::{
    AllocatorRequirements, ComponentEntry, EntryKind, EntryStack, LazyComponent, NoArgsComponent,
    TypeId,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::diagnostics::{InstallationTrace, NormalizationError, TraceFrame};

/// Unique direct binding per type, as produced by the expansion pass.
pub type BindingMap = FxHashMap<TypeId, ComponentEntry>;

/// Set key for with-args components; hashing and equality delegate to the
/// component's structural identity.
struct WithArgsKey(Rc<dyn LazyComponent>);

impl PartialEq for WithArgsKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl Eq for WithArgsKey {}

impl Hash for WithArgsKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash_code());
    }
}

/// The component whose second installation closed a loop.
enum Repeated<'a> {
    NoArgs(NoArgsComponent),
    WithArgs(&'a dyn LazyComponent),
}

/// Expands `toplevel_entries` and every lazy component reachable from them.
///
/// Direct bindings land in the returned map, with duplicates unified and
/// conflicting rebindings reported as fatal. Compressed-binding candidates
/// and multibinding pairs are not stored here; they stream out through the
/// two handlers so each caller keeps exactly the bookkeeping it needs.
pub(crate) fn expand_entries<FC, FM>(
    toplevel_entries: Vec<ComponentEntry>,
    allocator: &mut AllocatorRequirements,
    toplevel_component_fun_type_id: TypeId,
    mut handle_compressed_binding: FC,
    mut handle_multibinding: FM,
) -> Result<BindingMap, NormalizationError>
where
    FC: FnMut(ComponentEntry),
    FM: FnMut(ComponentEntry, ComponentEntry),
{
    let mut binding_map = BindingMap::default();

    // Lazy components whose expansion has completed.
    let mut fully_expanded_no_args: FxHashSet<NoArgsComponent> = FxHashSet::default();
    let mut fully_expanded_with_args: FxHashSet<WithArgsKey> = FxHashSet::default();

    // Lazy components whose end marker is still on the stack.
    let mut in_progress_no_args: FxHashSet<NoArgsComponent> = FxHashSet::default();
    let mut in_progress_with_args: FxHashSet<WithArgsKey> = FxHashSet::default();

    let mut stack: EntryStack = toplevel_entries;

    while let Some(entry) = stack.pop() {
        match entry.kind {
            EntryKind::ConstructedObject { .. }
            | EntryKind::NeedsAllocation(_)
            | EntryKind::NeedsNoAllocation(_) => {
                insert_direct_binding(&mut binding_map, allocator, entry)?;
            }

            EntryKind::CompressedBinding { .. } => handle_compressed_binding(entry),

            EntryKind::MultibindingConstructedObject { .. }
            | EntryKind::MultibindingNeedsAllocation(_)
            | EntryKind::MultibindingNeedsNoAllocation(_) => {
                let Some(creator) = stack.pop() else {
                    unreachable!(
                        "multibinding contribution for {} arrived without its vector creator",
                        entry.type_id
                    );
                };
                debug_assert!(
                    matches!(&creator.kind, EntryKind::MultibindingVectorCreator { .. }),
                    "entry below a multibinding contribution must be its vector creator"
                );
                handle_multibinding(entry, creator);
            }

            // Top-level pushes may interleave the pair either way around.
            EntryKind::MultibindingVectorCreator { .. } => {
                let Some(contribution) = stack.pop() else {
                    unreachable!(
                        "multibinding vector creator for {} arrived without a contribution",
                        entry.type_id
                    );
                };
                debug_assert!(
                    matches!(
                        &contribution.kind,
                        EntryKind::MultibindingConstructedObject { .. }
                            | EntryKind::MultibindingNeedsAllocation(_)
                            | EntryKind::MultibindingNeedsNoAllocation(_)
                    ),
                    "entry below a vector creator must be a multibinding contribution"
                );
                handle_multibinding(contribution, entry);
            }

            EntryKind::LazyComponentNoArgs { component } => {
                if fully_expanded_no_args.contains(&component) {
                    continue;
                }
                if !in_progress_no_args.insert(component) {
                    return Err(installation_loop(
                        toplevel_component_fun_type_id,
                        &stack,
                        entry.type_id,
                        Repeated::NoArgs(component),
                    ));
                }
                debug!(component = %entry.type_id, "expanding lazy component");
                stack.push(ComponentEntry {
                    type_id: entry.type_id,
                    kind: EntryKind::EndMarkerNoArgs { component },
                });
                component.add_bindings(&mut stack);
            }

            EntryKind::LazyComponentWithArgs { component } => {
                if fully_expanded_with_args.contains(&WithArgsKey(Rc::clone(&component))) {
                    continue;
                }
                if !in_progress_with_args.insert(WithArgsKey(Rc::clone(&component))) {
                    return Err(installation_loop(
                        toplevel_component_fun_type_id,
                        &stack,
                        component.fun_type_id(),
                        Repeated::WithArgs(component.as_ref()),
                    ));
                }
                debug!(component = %component.fun_type_id(), "expanding lazy component");
                stack.push(ComponentEntry {
                    type_id: entry.type_id,
                    kind: EntryKind::EndMarkerWithArgs { component: Rc::clone(&component) },
                });
                component.add_bindings(&mut stack);
            }

            EntryKind::EndMarkerNoArgs { component } => {
                in_progress_no_args.remove(&component);
                fully_expanded_no_args.insert(component);
            }

            EntryKind::EndMarkerWithArgs { component } => {
                let key = WithArgsKey(component);
                in_progress_with_args.remove(&key);
                fully_expanded_with_args.insert(key);
            }
        }
    }

    debug_assert!(in_progress_no_args.is_empty());
    debug_assert!(in_progress_with_args.is_empty());

    Ok(binding_map)
}

/// Inserts a direct binding, unifying consistent duplicates.
///
/// The allocator learns about a to-construct type exactly once, on first
/// insertion; a consistent duplicate must not reserve space again.
fn insert_direct_binding(
    binding_map: &mut BindingMap,
    allocator: &mut AllocatorRequirements,
    entry: ComponentEntry,
) -> Result<(), NormalizationError> {
    match binding_map.entry(entry.type_id) {
        MapEntry::Occupied(existing) => {
            if !existing.get().describes_same_binding(&entry) {
                return Err(NormalizationError::MultipleBindings { type_id: entry.type_id });
            }
            // Duplicate but consistent binding.
        }
        MapEntry::Vacant(slot) => {
            match &entry.kind {
                EntryKind::NeedsAllocation(_) => allocator.add_type(entry.type_id),
                EntryKind::NeedsNoAllocation(_) => {
                    allocator.add_externally_allocated_type(entry.type_id)
                }
                EntryKind::ConstructedObject { .. } => {}
                _ => unreachable!("only direct binding kinds reach the binding map"),
            }
            slot.insert(entry);
        }
    }
    Ok(())
}

/// Builds the loop diagnostic by walking the still-pending stack from the
/// top-level component down to the repeated one. Only end markers appear in
/// the walk; they are the expansion call stack.
fn installation_loop(
    toplevel_component_fun_type_id: TypeId,
    stack: &[ComponentEntry],
    repeated_fun_type_id: TypeId,
    repeated: Repeated<'_>,
) -> NormalizationError {
    let mut frames = Vec::new();
    for entry in stack {
        match &entry.kind {
            EntryKind::EndMarkerNoArgs { component } => {
                let loop_start = matches!(&repeated, Repeated::NoArgs(r) if r == component);
                frames.push(TraceFrame { fun_type_id: entry.type_id, loop_start });
            }
            EntryKind::EndMarkerWithArgs { component } => {
                let loop_start =
                    matches!(&repeated, Repeated::WithArgs(r) if r.dyn_eq(component.as_ref()));
                frames.push(TraceFrame { fun_type_id: component.fun_type_id(), loop_start });
            }
            _ => {}
        }
    }
    NormalizationError::InstallationLoop {
        trace: InstallationTrace {
            toplevel_component_fun_type_id,
            frames,
            repeated_fun_type_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_component::{ComponentWithArgs, CreateFn, DependencyList, VectorCreatorFn};

    struct Root;
    struct Config;
    struct Pool;
    struct Handler;

    fn make_config(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn make_pool(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn make_handler(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn handler_vector(_: *mut u8) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn expand_collecting(
        entries: Vec<ComponentEntry>,
    ) -> Result<(BindingMap, Vec<ComponentEntry>, Vec<(ComponentEntry, ComponentEntry)>), NormalizationError>
    {
        let mut allocator = AllocatorRequirements::new();
        let mut compressed = Vec::new();
        let mut pairs = Vec::new();
        let map = expand_entries(
            entries,
            &mut allocator,
            TypeId::of::<Root>(),
            |entry| compressed.push(entry),
            |contribution, creator| pairs.push((contribution, creator)),
        )?;
        Ok((map, compressed, pairs))
    }

    #[test]
    fn consistent_duplicate_is_unified() {
        let entry = ComponentEntry::needs_allocation(
            TypeId::of::<Config>(),
            CreateFn::new(make_config),
            DependencyList::empty(),
        );
        let mut allocator = AllocatorRequirements::new();
        let map = expand_entries(
            vec![entry.clone(), entry],
            &mut allocator,
            TypeId::of::<Root>(),
            |_| {},
            |_, _| {},
        )
        .unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(allocator.owned_types(), [TypeId::of::<Config>()]);
    }

    #[test]
    fn conflicting_rebinding_is_fatal() {
        let first = ComponentEntry::needs_allocation(
            TypeId::of::<Config>(),
            CreateFn::new(make_config),
            DependencyList::empty(),
        );
        let second = ComponentEntry::needs_allocation(
            TypeId::of::<Config>(),
            CreateFn::new(make_pool),
            DependencyList::empty(),
        );
        let error = expand_collecting(vec![first, second]).unwrap_err();
        assert!(matches!(
            error,
            NormalizationError::MultipleBindings { type_id } if type_id == TypeId::of::<Config>()
        ));
    }

    #[test]
    fn multibinding_pairs_are_accepted_in_either_order() {
        let contribution = ComponentEntry::multibinding_needs_allocation(
            TypeId::of::<Handler>(),
            CreateFn::new(make_handler),
            DependencyList::empty(),
        );
        let creator = ComponentEntry::multibinding_vector_creator(
            TypeId::of::<Handler>(),
            VectorCreatorFn::new(handler_vector),
        );

        // The stack is LIFO, so the later push is processed first.
        let (_, _, pairs) =
            expand_collecting(vec![creator.clone(), contribution.clone()]).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(matches!(&pairs[0].0.kind, EntryKind::MultibindingNeedsAllocation(_)));

        let (_, _, pairs) = expand_collecting(vec![contribution, creator]).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(matches!(&pairs[0].0.kind, EntryKind::MultibindingNeedsAllocation(_)));
        assert!(matches!(&pairs[0].1.kind, EntryKind::MultibindingVectorCreator { .. }));
    }

    #[test]
    fn compressed_entries_stream_to_their_handler() {
        let compressed = ComponentEntry::compressed_binding(
            TypeId::of::<Config>(),
            TypeId::of::<Pool>(),
            CreateFn::new(make_pool),
        );
        let (map, collected, _) = expand_collecting(vec![compressed]).unwrap();
        assert!(map.is_empty());
        assert_eq!(collected.len(), 1);
    }

    fn install_pool(_: &u32, stack: &mut EntryStack) {
        stack.push(ComponentEntry::needs_allocation(
            TypeId::of::<Pool>(),
            CreateFn::new(make_pool),
            DependencyList::empty(),
        ));
    }

    #[test]
    fn lazy_component_contributes_its_bindings_once() {
        let first = ComponentWithArgs::new(TypeId::of::<Pool>(), 4u32, install_pool).into_entry();
        let again = ComponentWithArgs::new(TypeId::of::<Pool>(), 4u32, install_pool).into_entry();
        let (map, _, _) = expand_collecting(vec![first, again]).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&TypeId::of::<Pool>()));
    }

    #[test]
    fn lazy_components_with_different_arguments_both_expand() {
        fn install_sized(size: &u32, stack: &mut EntryStack) {
            // Distinguish the two installations by which type they bind.
            if *size == 4 {
                stack.push(ComponentEntry::needs_allocation(
                    TypeId::of::<Pool>(),
                    CreateFn::new(make_pool),
                    DependencyList::empty(),
                ));
            } else {
                stack.push(ComponentEntry::needs_allocation(
                    TypeId::of::<Config>(),
                    CreateFn::new(make_config),
                    DependencyList::empty(),
                ));
            }
        }
        let small = ComponentWithArgs::new(TypeId::of::<Pool>(), 4u32, install_sized).into_entry();
        let large = ComponentWithArgs::new(TypeId::of::<Pool>(), 8u32, install_sized).into_entry();
        let (map, _, _) = expand_collecting(vec![small, large]).unwrap();
        assert_eq!(map.len(), 2);
    }

    fn no_args_fun() {}

    fn install_no_args(stack: &mut EntryStack) {
        stack.push(ComponentEntry::needs_no_allocation(
            TypeId::of::<Handler>(),
            CreateFn::new(make_handler),
            DependencyList::empty(),
        ));
    }

    #[test]
    fn no_args_component_expands_and_registers_external_allocation() {
        let component = NoArgsComponent::new(no_args_fun, install_no_args);
        let entry = ComponentEntry::lazy_component_no_args(TypeId::of::<Handler>(), component);
        let mut allocator = AllocatorRequirements::new();
        let map = expand_entries(
            vec![entry.clone(), entry],
            &mut allocator,
            TypeId::of::<Root>(),
            |_| {},
            |_, _| {},
        )
        .unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(allocator.externally_allocated_types(), [TypeId::of::<Handler>()]);
    }

    struct LoopA;
    struct LoopB;

    fn install_loop_a(_: &(), stack: &mut EntryStack) {
        stack.push(ComponentWithArgs::new(TypeId::of::<LoopB>(), (), install_loop_b).into_entry());
    }

    fn install_loop_b(_: &(), stack: &mut EntryStack) {
        stack.push(ComponentWithArgs::new(TypeId::of::<LoopA>(), (), install_loop_a).into_entry());
    }

    #[test]
    fn installation_loop_is_detected_and_traced() {
        let root = ComponentWithArgs::new(TypeId::of::<LoopA>(), (), install_loop_a).into_entry();
        let error = expand_collecting(vec![root]).unwrap_err();

        let NormalizationError::InstallationLoop { trace } = error else {
            panic!("expected an installation loop");
        };
        assert_eq!(trace.repeated_fun_type_id, TypeId::of::<LoopA>());
        let marked: Vec<_> = trace.frames.iter().filter(|frame| frame.loop_start).collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].fun_type_id, TypeId::of::<LoopA>());
    }
}
