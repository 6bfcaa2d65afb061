//! Storage planning for the injector's fixed-size allocator.

use crate::type_id::TypeId;

/// Accumulated storage requirements handed to the fixed-size allocator when
/// the injector is built.
///
/// Normalization reports every type that will need an injector-owned
/// allocation and every type constructed into externally provided storage.
/// Calls are recorded in arrival order; the injector sizes one contiguous
/// buffer from `total_size` and uses the per-type lists to plan destruction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AllocatorRequirements {
    owned: Vec<TypeId>,
    externally_allocated: Vec<TypeId>,
    total_size: usize,
}

impl AllocatorRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves space for one injector-owned instance of `type_id`.
    pub fn add_type(&mut self, type_id: TypeId) {
        // Worst case: the allocator's bump pointer is maximally misaligned.
        self.total_size += type_id.size() + type_id.align() - 1;
        self.owned.push(type_id);
    }

    /// Registers one instance of `type_id` constructed into storage the
    /// caller provides; no space is reserved but destruction is still owed.
    pub fn add_externally_allocated_type(&mut self, type_id: TypeId) {
        self.externally_allocated.push(type_id);
    }

    /// Types that receive injector-owned storage, in registration order.
    pub fn owned_types(&self) -> &[TypeId] {
        &self.owned
    }

    /// Types constructed into externally provided storage, in registration
    /// order.
    pub fn externally_allocated_types(&self) -> &[TypeId] {
        &self.externally_allocated
    }

    /// Bytes of contiguous storage the owned instances need in the worst
    /// case.
    pub fn total_size(&self) -> usize {
        self.total_size
    }
}
