// id.rs — Stable semantic identifiers for resolution artifacts
//
// These IDs provide deterministic, span-independent identity for the
// artifacts of one resolution pass. Allocated in model order during
// index construction and descriptor assembly, so an unchanged model
// always yields the same assignment. Serialized as bare numbers in the
// emitter-facing output.

use serde::Serialize;

/// Stable identifier for a component definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DefId(pub u32);

/// Stable identifier for a component instance site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstId(pub u32);

/// Stable identifier for a resolved connector descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnId(pub u32);

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation (model) order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_def: u32,
    next_inst: u32,
    next_conn: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_def(&mut self) -> DefId {
        let id = DefId(self.next_def);
        self.next_def += 1;
        id
    }

    pub fn alloc_inst(&mut self) -> InstId {
        let id = InstId(self.next_inst);
        self.next_inst += 1;
        id
    }

    pub fn alloc_conn(&mut self) -> ConnId {
        let id = ConnId(self.next_conn);
        self.next_conn += 1;
        id
    }
}
