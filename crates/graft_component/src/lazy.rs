//! Lazy sub-components: deferred `install` declarations that contribute their
//! bindings only when the normalization engine expands them.
//!
//! Two shapes exist. A component installed without arguments is identified by
//! the bare function that defines it; one installed with arguments must carry
//! the argument values so that two installations compare equal exactly when
//! the function and the arguments match.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHasher;

use crate::entry::{ComponentEntry, EntryStack};
use crate::type_id::TypeId;

/// Deferred sub-component installed without arguments.
///
/// Identity for deduplication and cycle detection is the address of
/// `erased_fun`, the type-erased component function itself.
#[derive(Clone, Copy)]
pub struct NoArgsComponent {
    erased_fun: fn(),
    add_bindings: fn(&mut EntryStack),
}

impl NoArgsComponent {
    pub fn new(erased_fun: fn(), add_bindings: fn(&mut EntryStack)) -> Self {
        NoArgsComponent { erased_fun, add_bindings }
    }

    /// Address used for identity comparisons.
    pub fn erased_fun_addr(&self) -> usize {
        self.erased_fun as usize
    }

    /// Pushes this component's bindings onto the work stack.
    pub fn add_bindings(&self, stack: &mut EntryStack) {
        (self.add_bindings)(stack)
    }
}

impl PartialEq for NoArgsComponent {
    fn eq(&self, other: &Self) -> bool {
        self.erased_fun_addr() == other.erased_fun_addr()
    }
}

impl Eq for NoArgsComponent {}

impl Hash for NoArgsComponent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.erased_fun_addr());
    }
}

impl fmt::Debug for NoArgsComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoArgsComponent({:#x})", self.erased_fun_addr())
    }
}

/// Deferred sub-component carrying installation arguments.
///
/// Implementations compare structurally across erased argument types, so the
/// engine can recognize the same installation arriving twice and reject a
/// component that installs itself.
pub trait LazyComponent {
    /// Stable hash consistent with [`LazyComponent::dyn_eq`].
    fn hash_code(&self) -> u64;

    /// Structural equality across erased implementations.
    fn dyn_eq(&self, other: &dyn LazyComponent) -> bool;

    /// Identity of the component function, used in diagnostics.
    fn fun_type_id(&self) -> TypeId;

    /// Pushes this component's bindings onto the work stack.
    fn add_bindings(&self, stack: &mut EntryStack);

    /// Downcast hook for [`LazyComponent::dyn_eq`] implementations.
    fn as_any(&self) -> &dyn Any;
}

/// A component function paired with its argument tuple.
///
/// This is the adapter the codegen layer instantiates for every `install`
/// with arguments; equality and hashing cover the function identity and the
/// argument values, and hashing uses the fixed-seed Fx hasher so identical
/// installations hash identically from run to run.
pub struct ComponentWithArgs<A> {
    fun_type_id: TypeId,
    args: A,
    add_bindings: fn(&A, &mut EntryStack),
}

impl<A: Hash + Eq + 'static> ComponentWithArgs<A> {
    pub fn new(fun_type_id: TypeId, args: A, add_bindings: fn(&A, &mut EntryStack)) -> Self {
        ComponentWithArgs { fun_type_id, args, add_bindings }
    }

    /// Wraps this component into the entry the codegen layer emits for it.
    pub fn into_entry(self) -> ComponentEntry {
        ComponentEntry::lazy_component_with_args(Rc::new(self))
    }
}

impl<A: Hash + Eq + 'static> LazyComponent for ComponentWithArgs<A> {
    fn hash_code(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.fun_type_id.hash(&mut hasher);
        self.args.hash(&mut hasher);
        hasher.finish()
    }

    fn dyn_eq(&self, other: &dyn LazyComponent) -> bool {
        match other.as_any().downcast_ref::<Self>() {
            Some(other) => self.fun_type_id == other.fun_type_id && self.args == other.args,
            None => false,
        }
    }

    fn fun_type_id(&self) -> TypeId {
        self.fun_type_id
    }

    fn add_bindings(&self, stack: &mut EntryStack) {
        (self.add_bindings)(&self.args, stack)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
