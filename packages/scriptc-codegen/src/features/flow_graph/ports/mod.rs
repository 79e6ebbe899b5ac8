mod visitor;

pub use visitor::{walk_edge, GraphVisitor};
