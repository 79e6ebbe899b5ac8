//! Process-wide call-site registry
//!
//! Executions that share compiled code share call sites: the first execution
//! reaching a site creates its state, every later one reuses it (and its
//! cache).

use std::sync::Arc;

use dashmap::DashMap;

use super::binder::{BinderOptions, CallSite};
use super::call_site::{CallSiteDescriptor, CallSiteId};

#[derive(Debug, Default)]
pub struct CallSiteRegistry {
    sites: DashMap<CallSiteId, Arc<CallSite>>,
    options: BinderOptions,
}

impl CallSiteRegistry {
    pub fn new(options: BinderOptions) -> Self {
        Self {
            sites: DashMap::new(),
            options,
        }
    }

    /// Shared state for `descriptor`, created on first request
    pub fn site(&self, descriptor: &CallSiteDescriptor) -> Arc<CallSite> {
        if let Some(site) = self.sites.get(&descriptor.id) {
            return Arc::clone(site.value());
        }
        let options = self.options;
        Arc::clone(
            self.sites
                .entry(descriptor.id)
                .or_insert_with(|| Arc::new(CallSite::new(descriptor.clone(), options)))
                .value(),
        )
    }

    pub fn get(&self, id: CallSiteId) -> Option<Arc<CallSite>> {
        self.sites.get(&id).map(|site| Arc::clone(site.value()))
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Sum of resolutions over all sites
    pub fn total_resolutions(&self) -> usize {
        self.sites.iter().map(|site| site.resolution_count()).sum()
    }
}
