//! Built-in jobs.

mod page;

pub use page::{extract_links, extract_title, PageJob, PageJobFactory, PAGE_JOB_NAME};

use std::sync::Arc;

use crate::engine::StaticJobRegistry;

/// A registry holding every built-in job.
pub fn builtin_registry() -> StaticJobRegistry {
    StaticJobRegistry::new().with(Arc::new(PageJobFactory))
}
