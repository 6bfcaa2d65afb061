//! Component entries: the unit of work produced by the codegen layer.
//!
//! Every `install`/`bind`/`multibind` declaration compiles down to one or two
//! [`ComponentEntry`] values. The normalization engine consumes a stack of
//! these; it never invokes the erased functions or dereferences the object
//! pointers carried here, it only compares and copies their identities.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use crate::lazy::{LazyComponent, NoArgsComponent};
use crate::type_id::TypeId;

/// Erased signature shared by creation routines: the injector passes its
/// storage handle and receives the address of the resulting object.
pub type RawErasedFn = fn(*mut u8) -> *mut u8;

/// Identity of an erased object-creation routine.
#[derive(Clone, Copy)]
pub struct CreateFn(RawErasedFn);

impl CreateFn {
    pub fn new(f: RawErasedFn) -> Self {
        CreateFn(f)
    }

    /// Address used for identity comparisons.
    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

impl PartialEq for CreateFn {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for CreateFn {}

impl Hash for CreateFn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.addr());
    }
}

impl fmt::Debug for CreateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CreateFn({:#x})", self.addr())
    }
}

/// Identity of the erased routine that materializes the aggregated vector of
/// a multibinding set.
#[derive(Clone, Copy)]
pub struct VectorCreatorFn(RawErasedFn);

impl VectorCreatorFn {
    pub fn new(f: RawErasedFn) -> Self {
        VectorCreatorFn(f)
    }

    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

impl PartialEq for VectorCreatorFn {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for VectorCreatorFn {}

impl fmt::Debug for VectorCreatorFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorCreatorFn({:#x})", self.addr())
    }
}

/// Address of a pre-built instance. Never dereferenced during normalization.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectPtr(*const u8);

impl ObjectPtr {
    pub fn new(ptr: *const u8) -> Self {
        ObjectPtr(ptr)
    }

    /// Identity of an instance the caller keeps alive for the injector's
    /// whole lifetime.
    pub fn from_ref<T>(object: &'static T) -> Self {
        ObjectPtr(object as *const T as *const u8)
    }

    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPtr({:#x})", self.addr())
    }
}

/// Ordered list of the types a binding needs before it can be constructed.
///
/// The codegen layer emits one shared list per creation routine; clones are
/// reference-counted, so copying an entry never copies the list itself.
#[derive(Clone)]
pub struct DependencyList(Rc<[TypeId]>);

impl DependencyList {
    pub fn empty() -> Self {
        DependencyList(Rc::from([]))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeId> {
        self.0.iter()
    }
}

impl From<Vec<TypeId>> for DependencyList {
    fn from(deps: Vec<TypeId>) -> Self {
        DependencyList(Rc::from(deps))
    }
}

impl From<&[TypeId]> for DependencyList {
    fn from(deps: &[TypeId]) -> Self {
        DependencyList(Rc::from(deps))
    }
}

impl Deref for DependencyList {
    type Target = [TypeId];

    fn deref(&self) -> &[TypeId] {
        &self.0
    }
}

impl PartialEq for DependencyList {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for DependencyList {}

impl fmt::Debug for DependencyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Payload shared by the two to-construct binding kinds.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConstructBinding {
    pub create: CreateFn,
    pub deps: DependencyList,
}

/// The tagged payload of a [`ComponentEntry`].
#[derive(Clone)]
pub enum EntryKind {
    /// Binding to an instance that already exists.
    ConstructedObject { object: ObjectPtr },
    /// Binding whose object is allocated by the injector and constructed on
    /// first use.
    NeedsAllocation(ConstructBinding),
    /// Binding whose object is constructed into storage provided externally.
    NeedsNoAllocation(ConstructBinding),
    /// Candidate for binding compression: the entry's own type is the
    /// interface `I`, bound to the single implementation `c_type_id`, and
    /// `create` constructs the implementation directly when the pair is
    /// collapsed.
    CompressedBinding { c_type_id: TypeId, create: CreateFn },
    /// Contribution of a pre-built instance to a multibinding set.
    MultibindingConstructedObject { object: ObjectPtr },
    /// To-construct contribution that needs injector-owned storage.
    MultibindingNeedsAllocation(ConstructBinding),
    /// To-construct contribution placed in externally provided storage.
    MultibindingNeedsNoAllocation(ConstructBinding),
    /// How to materialize the aggregated vector for the entry's type.
    MultibindingVectorCreator { get_vector: VectorCreatorFn },
    /// Deferred sub-component identified by a bare function.
    LazyComponentNoArgs { component: NoArgsComponent },
    /// Deferred sub-component carrying installation arguments.
    LazyComponentWithArgs { component: Rc<dyn LazyComponent> },
    /// Sentinel marking the completed expansion of a no-args component.
    EndMarkerNoArgs { component: NoArgsComponent },
    /// Sentinel marking the completed expansion of a with-args component.
    EndMarkerWithArgs { component: Rc<dyn LazyComponent> },
}

impl PartialEq for EntryKind {
    fn eq(&self, other: &Self) -> bool {
        use EntryKind::*;
        match (self, other) {
            (ConstructedObject { object: a }, ConstructedObject { object: b }) => a == b,
            (NeedsAllocation(a), NeedsAllocation(b)) => a == b,
            (NeedsNoAllocation(a), NeedsNoAllocation(b)) => a == b,
            (
                CompressedBinding { c_type_id: ca, create: fa },
                CompressedBinding { c_type_id: cb, create: fb },
            ) => ca == cb && fa == fb,
            (
                MultibindingConstructedObject { object: a },
                MultibindingConstructedObject { object: b },
            ) => a == b,
            (MultibindingNeedsAllocation(a), MultibindingNeedsAllocation(b)) => a == b,
            (MultibindingNeedsNoAllocation(a), MultibindingNeedsNoAllocation(b)) => a == b,
            (
                MultibindingVectorCreator { get_vector: a },
                MultibindingVectorCreator { get_vector: b },
            ) => a == b,
            (LazyComponentNoArgs { component: a }, LazyComponentNoArgs { component: b }) => a == b,
            (EndMarkerNoArgs { component: a }, EndMarkerNoArgs { component: b }) => a == b,
            (LazyComponentWithArgs { component: a }, LazyComponentWithArgs { component: b })
            | (EndMarkerWithArgs { component: a }, EndMarkerWithArgs { component: b }) => {
                a.dyn_eq(b.as_ref())
            }
            _ => false,
        }
    }
}

impl fmt::Debug for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use EntryKind::*;
        match self {
            ConstructedObject { object } => {
                f.debug_struct("ConstructedObject").field("object", object).finish()
            }
            NeedsAllocation(binding) => f.debug_tuple("NeedsAllocation").field(binding).finish(),
            NeedsNoAllocation(binding) => {
                f.debug_tuple("NeedsNoAllocation").field(binding).finish()
            }
            CompressedBinding { c_type_id, create } => f
                .debug_struct("CompressedBinding")
                .field("c_type_id", c_type_id)
                .field("create", create)
                .finish(),
            MultibindingConstructedObject { object } => f
                .debug_struct("MultibindingConstructedObject")
                .field("object", object)
                .finish(),
            MultibindingNeedsAllocation(binding) => {
                f.debug_tuple("MultibindingNeedsAllocation").field(binding).finish()
            }
            MultibindingNeedsNoAllocation(binding) => {
                f.debug_tuple("MultibindingNeedsNoAllocation").field(binding).finish()
            }
            MultibindingVectorCreator { get_vector } => f
                .debug_struct("MultibindingVectorCreator")
                .field("get_vector", get_vector)
                .finish(),
            LazyComponentNoArgs { component } => {
                f.debug_tuple("LazyComponentNoArgs").field(component).finish()
            }
            LazyComponentWithArgs { component } => f
                .debug_tuple("LazyComponentWithArgs")
                .field(&component.fun_type_id())
                .finish(),
            EndMarkerNoArgs { component } => {
                f.debug_tuple("EndMarkerNoArgs").field(component).finish()
            }
            EndMarkerWithArgs { component } => f
                .debug_tuple("EndMarkerWithArgs")
                .field(&component.fun_type_id())
                .finish(),
        }
    }
}

/// One unit of the binding stream: a type identity plus the tagged payload
/// describing how that type is provided.
#[derive(Clone, PartialEq, Debug)]
pub struct ComponentEntry {
    pub type_id: TypeId,
    pub kind: EntryKind,
}

/// The LIFO work stack lazy components push their bindings onto.
pub type EntryStack = Vec<ComponentEntry>;

impl ComponentEntry {
    pub fn constructed_object(type_id: TypeId, object: ObjectPtr) -> Self {
        ComponentEntry { type_id, kind: EntryKind::ConstructedObject { object } }
    }

    pub fn needs_allocation(type_id: TypeId, create: CreateFn, deps: DependencyList) -> Self {
        ComponentEntry { type_id, kind: EntryKind::NeedsAllocation(ConstructBinding { create, deps }) }
    }

    pub fn needs_no_allocation(type_id: TypeId, create: CreateFn, deps: DependencyList) -> Self {
        ComponentEntry {
            type_id,
            kind: EntryKind::NeedsNoAllocation(ConstructBinding { create, deps }),
        }
    }

    /// Candidate compression of the pair `i_type_id -> c_type_id`.
    pub fn compressed_binding(i_type_id: TypeId, c_type_id: TypeId, create: CreateFn) -> Self {
        ComponentEntry { type_id: i_type_id, kind: EntryKind::CompressedBinding { c_type_id, create } }
    }

    pub fn multibinding_constructed_object(type_id: TypeId, object: ObjectPtr) -> Self {
        ComponentEntry { type_id, kind: EntryKind::MultibindingConstructedObject { object } }
    }

    pub fn multibinding_needs_allocation(
        type_id: TypeId,
        create: CreateFn,
        deps: DependencyList,
    ) -> Self {
        ComponentEntry {
            type_id,
            kind: EntryKind::MultibindingNeedsAllocation(ConstructBinding { create, deps }),
        }
    }

    pub fn multibinding_needs_no_allocation(
        type_id: TypeId,
        create: CreateFn,
        deps: DependencyList,
    ) -> Self {
        ComponentEntry {
            type_id,
            kind: EntryKind::MultibindingNeedsNoAllocation(ConstructBinding { create, deps }),
        }
    }

    pub fn multibinding_vector_creator(type_id: TypeId, get_vector: VectorCreatorFn) -> Self {
        ComponentEntry { type_id, kind: EntryKind::MultibindingVectorCreator { get_vector } }
    }

    /// Deferred sub-component identified by `fun_type_id`.
    pub fn lazy_component_no_args(fun_type_id: TypeId, component: NoArgsComponent) -> Self {
        ComponentEntry { type_id: fun_type_id, kind: EntryKind::LazyComponentNoArgs { component } }
    }

    pub fn lazy_component_with_args(component: Rc<dyn LazyComponent>) -> Self {
        ComponentEntry {
            type_id: component.fun_type_id(),
            kind: EntryKind::LazyComponentWithArgs { component },
        }
    }

    /// Whether two entries for the same type describe the same binding.
    ///
    /// Duplicate entries are legal as long as they agree on kind and on the
    /// object or creation-routine identity; anything else is a conflicting
    /// rebinding.
    pub fn describes_same_binding(&self, other: &ComponentEntry) -> bool {
        use EntryKind::*;
        if self.type_id != other.type_id {
            return false;
        }
        match (&self.kind, &other.kind) {
            (ConstructedObject { object: a }, ConstructedObject { object: b }) => a == b,
            (NeedsAllocation(a), NeedsAllocation(b)) => a.create == b.create,
            (NeedsNoAllocation(a), NeedsNoAllocation(b)) => a.create == b.create,
            _ => false,
        }
    }
}
