use std::sync::atomic::{AtomicU32, Ordering};

use scriptc_runtime::CallSiteId;

/// Issues call-site ids unique across one compilation
#[derive(Debug, Default)]
pub struct CallSiteIds {
    next: AtomicU32,
}

impl CallSiteIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> CallSiteId {
        CallSiteId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn issued(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}
