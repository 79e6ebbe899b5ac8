mod path;
mod populator;
mod table;

pub use path::normalize_path;
pub use populator::{DeclarationPopulator, PopulateOptions};
pub use table::DeclarationTable;
