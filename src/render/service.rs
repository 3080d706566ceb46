//! Engine worker: runs the render engine on its own thread.
//!
//! Document facts (page count, first page size) are read synchronously
//! at construction, before the engine moves into the worker; after that
//! the engine is reachable only through the request channel, which is
//! what guarantees no two renders touch the surface concurrently.

use std::thread::JoinHandle;

use log::{debug, warn};

use crate::render::engine::{DocumentInfo, PageRenderEngine, PageSurface, WorkerFault};

#[derive(Debug)]
pub struct RenderResponse {
    pub page: u32,
    pub scale: f64,
    pub outcome: Result<PageSurface, WorkerFault>,
}

enum Envelope {
    Render { page: u32, scale: f64 },
    Shutdown,
}

pub struct RenderService {
    request_tx: flume::Sender<Envelope>,
    response_rx: flume::Receiver<RenderResponse>,
    worker: Option<JoinHandle<()>>,
    info: DocumentInfo,
}

impl RenderService {
    pub fn new(engine: Box<dyn PageRenderEngine>) -> Result<Self, WorkerFault> {
        let info = DocumentInfo {
            page_count: engine.page_count(),
            first_page_size: engine.page_size(1)?,
        };

        let (request_tx, request_rx) = flume::unbounded::<Envelope>();
        let (response_tx, response_rx) = flume::unbounded::<RenderResponse>();

        let worker = std::thread::Builder::new()
            .name("render-worker".to_string())
            .spawn(move || worker_loop(engine, &request_rx, &response_tx))
            .map_err(|e| WorkerFault::generic(format!("spawning render worker: {e}")))?;

        Ok(Self {
            request_tx,
            response_rx,
            worker: Some(worker),
            info,
        })
    }

    #[must_use]
    pub fn document_info(&self) -> DocumentInfo {
        self.info
    }

    pub fn submit(&self, page: u32, scale: f64) {
        debug!("render submit page={page} scale={scale}");
        if self.request_tx.send(Envelope::Render { page, scale }).is_err() {
            warn!("render worker is gone; page {page} will not render");
        }
    }

    /// Drain finished renders since the last tick.
    pub fn poll_responses(&self) -> Vec<RenderResponse> {
        let mut responses = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            responses.push(response);
        }
        responses
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        let _ = self.request_tx.send(Envelope::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    mut engine: Box<dyn PageRenderEngine>,
    requests: &flume::Receiver<Envelope>,
    responses: &flume::Sender<RenderResponse>,
) {
    while let Ok(envelope) = requests.recv() {
        let (page, scale) = match envelope {
            Envelope::Render { page, scale } => (page, scale),
            Envelope::Shutdown => break,
        };
        let outcome = engine.render(page, scale);
        if let Err(fault) = &outcome {
            warn!("render page={page} scale={scale} failed: {fault}");
        }
        if responses
            .send(RenderResponse {
                page,
                scale,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }
    debug!("render worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PdfSize;
    use crate::test_utils::FakeEngine;
    use std::time::{Duration, Instant};

    fn wait_for(service: &RenderService, count: usize) -> Vec<RenderResponse> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut all = Vec::new();
        while all.len() < count && Instant::now() < deadline {
            all.extend(service.poll_responses());
            std::thread::sleep(Duration::from_millis(5));
        }
        all
    }

    #[test]
    fn document_info_is_available_immediately() {
        let service = RenderService::new(Box::new(FakeEngine::new(3))).unwrap();
        let info = service.document_info();
        assert_eq!(info.page_count, 3);
        assert_eq!(info.first_page_size, PdfSize::LETTER);
    }

    #[test]
    fn rendered_surface_echoes_page_and_scale() {
        let service = RenderService::new(Box::new(FakeEngine::new(3))).unwrap();
        service.submit(2, 1.5);

        let responses = wait_for(&service, 1);
        assert_eq!(responses.len(), 1);
        let surface = responses[0].outcome.as_ref().unwrap();
        assert_eq!((responses[0].page, responses[0].scale), (2, 1.5));
        assert_eq!(surface.page, 2);
        assert_eq!(surface.scale, 1.5);
        assert_eq!(surface.width_px, (612.0_f64 * 1.5).round() as u32);
    }

    #[test]
    fn engine_failures_surface_as_faults() {
        let service = RenderService::new(Box::new(FakeEngine::new(3))).unwrap();
        // FakeEngine rejects pages beyond the document.
        service.submit(9, 1.0);
        let responses = wait_for(&service, 1);
        assert!(responses[0].outcome.is_err());
    }
}
