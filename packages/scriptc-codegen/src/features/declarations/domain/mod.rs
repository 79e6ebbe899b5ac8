mod entries;

pub use entries::{
    DeclOrigin, Declaration, FileEntry, FunctionEntry, TypeEntry, MAGIC_INVOKE, USER_INITIALIZER,
};
