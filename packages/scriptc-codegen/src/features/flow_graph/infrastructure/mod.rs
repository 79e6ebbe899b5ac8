mod reachability;
mod validation;

pub use reachability::Reachability;
