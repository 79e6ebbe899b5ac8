mod method_generator;

pub use method_generator::{MethodGenerator, WorkItem};
