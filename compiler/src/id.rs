// id.rs — Stable semantic identifiers for graph nodes
//
// Every node kind in the graph arena gets its own `u32` newtype, allocated
// in creation order by the builder. Creation order is the only identity a
// node has; the arenas in `ir::Graph` are indexed directly by these.

/// Stable identifier for a hardware unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

/// Stable identifier for an input port of a sequential unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

/// Stable identifier for a register array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayId(pub u32);

/// Stable identifier for an asynchronous memory component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemId(pub u32);

/// Stable identifier for a block within a unit body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Stable identifier for an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

macro_rules! impl_index {
    ($($t:ty),*) => {
        $(impl $t {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        })*
    };
}

impl_index!(UnitId, PortId, ArrayId, MemId, BlockId, ExprId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_by_allocation() {
        assert!(UnitId(0) < UnitId(1));
        assert_eq!(ExprId(7).index(), 7);
    }
}
