mod instruction;
mod method_body;

pub use instruction::{Instruction, LocalId, MethodRef};
pub use method_body::{
    BodyKind, ExceptionRegion, LocalInfo, LocalKind, MethodBody, RegionKind, SequencePoint,
};
