use super::allocator::SiteAllocator;
use super::config::RestoreConfig;
use super::progress::ProgressReporter;
use super::services::Services;
use crate::core::grid::peaks::PeakDetector;

/// Read-only collaborators shared by every transition of one run.
#[derive(Clone, Copy)]
pub struct RefinementContext<'a> {
    pub config: &'a RestoreConfig,
    pub services: Services<'a>,
    pub reporter: &'a ProgressReporter<'a>,
    pub detector: PeakDetector,
    pub allocator: SiteAllocator<'a>,
}

impl<'a> RefinementContext<'a> {
    pub fn new(
        config: &'a RestoreConfig,
        services: Services<'a>,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            config,
            services,
            reporter,
            detector: PeakDetector::new(config.detection.min_peak_distance),
            allocator: SiteAllocator::new(&config.allocation),
        }
    }

    pub fn tracked_kind(&self) -> &'a str {
        &self.config.allocation.tracked_kind
    }
}
