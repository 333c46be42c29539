//! Neighbor bookkeeping and distance-vector routing

pub mod distance_vector;
pub mod neighbor;
pub mod node;

pub use self::distance_vector::DistanceVectorEngine;
pub use self::neighbor::{Neighbor, NeighborTable};
pub use self::node::{Node, NodeSnapshot};
