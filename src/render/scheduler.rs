//! Render serialization: one render in flight, latest request wins.
//!
//! A second request arriving while one is in progress is queued, and
//! only the newest queued request survives; superseded intermediates
//! are dropped without ever rendering. Whether a completed surface is
//! still worth showing is a separate check against the viewport, made
//! where surfaces are applied.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderJob {
    pub page: u32,
    pub scale: f64,
}

#[derive(Debug, Default)]
pub struct RenderScheduler {
    in_flight: Option<RenderJob>,
    pending: Option<RenderJob>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a render. `Some` means dispatch this job now; `None`
    /// means it was queued behind the one in flight.
    pub fn request(&mut self, job: RenderJob) -> Option<RenderJob> {
        if self.in_flight.is_none() {
            self.in_flight = Some(job);
            Some(job)
        } else {
            self.pending = Some(job);
            None
        }
    }

    /// The in-flight render finished (success or not). Returns the
    /// queued job to dispatch next, already marked in flight.
    pub fn finish(&mut self) -> Option<RenderJob> {
        self.in_flight = self.pending.take();
        self.in_flight
    }

    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Forget everything, e.g. when a new document replaces the old.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.pending = None;
    }
}
