use crawlrt_core::CrawlManager;

/// Shared application state
pub struct AppState {
    manager: CrawlManager,
}

impl AppState {
    pub fn new(manager: CrawlManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &CrawlManager {
        &self.manager
    }
}
