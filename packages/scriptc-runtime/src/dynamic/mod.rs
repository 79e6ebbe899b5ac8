//! Late-bound method dispatch

pub mod binder;
pub mod call_site;
pub mod registry;

pub use binder::{BinderOptions, Binding, CallSite};
pub use call_site::{ArgShape, CallSiteDescriptor, CallSiteId, MagicMethod, NameStrategy};
pub use registry::CallSiteRegistry;
