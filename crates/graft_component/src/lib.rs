//! graft_component - the component entry data model of the graft injection toolkit.
//!
//! The codegen layer of graft compiles every `install`/`bind` declaration down to a
//! flat stream of [`ComponentEntry`] values. This crate defines that stream's
//! vocabulary (type identities, binding payloads, lazy sub-components, the
//! allocator plan) and nothing else; the normalization engine that consumes it
//! lives in `graft_normalize`.

pub mod allocator;
pub mod entry;
pub mod lazy;
pub mod type_id;

pub use allocator::AllocatorRequirements;
pub use entry::{
    ComponentEntry, ConstructBinding, CreateFn, DependencyList, EntryKind, EntryStack, ObjectPtr,
    VectorCreatorFn,
};
pub use lazy::{ComponentWithArgs, LazyComponent, NoArgsComponent};
pub use type_id::TypeId;
