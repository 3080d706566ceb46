//! Shared fakes for unit and integration tests: a scripted HTTP
//! transport, a deterministic render engine, and terminal helpers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ratatui::Terminal;
use ratatui::backend::TestBackend;

use crate::api::client::{ApiTransport, ProbeOutcome};
use crate::api::error::ApiError;
use crate::geometry::PdfSize;
use crate::render::engine::{PageRenderEngine, PageSurface, WorkerFault};

/// One call the scripted transport saw, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub json_body: Option<serde_json::Value>,
    pub form_body: Option<Vec<(String, String)>>,
}

#[derive(Default)]
struct TransportState {
    head_responses: HashMap<String, Result<ProbeOutcome, String>>,
    json_responses: HashMap<String, Vec<serde_json::Value>>,
    byte_responses: HashMap<String, Vec<u8>>,
    calls: Vec<RecordedCall>,
}

/// Scripted `ApiTransport`. Clone it before handing it to the client to
/// keep a handle for scripting and assertions; all clones share state.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_head(&self, path: &str, outcome: Result<ProbeOutcome, ApiError>) {
        let mut state = self.state.lock().unwrap();
        state
            .head_responses
            .insert(path.to_string(), outcome.map_err(|e| e.to_string()));
    }

    /// Queue a JSON response for a path. Multiple responses for the
    /// same path are served in script order.
    pub fn script_json(&self, path: &str, value: serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        state
            .json_responses
            .entry(path.to_string())
            .or_default()
            .push(value);
    }

    pub fn script_bytes(&self, path: &str, bytes: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.byte_responses.insert(path.to_string(), bytes);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }

    fn record(&self, call: RecordedCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn next_json(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let mut state = self.state.lock().unwrap();
        let queue = state
            .json_responses
            .get_mut(path)
            .filter(|queue| !queue.is_empty())
            .ok_or_else(|| {
                ApiError::NetworkOrServer(format!("no scripted response for {path}"))
            })?;
        Ok(if queue.len() == 1 {
            queue[0].clone()
        } else {
            queue.remove(0)
        })
    }
}

impl ApiTransport for ScriptedTransport {
    fn head(&self, path: &str) -> Result<ProbeOutcome, ApiError> {
        self.record(RecordedCall {
            method: "HEAD",
            path: path.to_string(),
            json_body: None,
            form_body: None,
        });
        let state = self.state.lock().unwrap();
        match state.head_responses.get(path) {
            Some(Ok(outcome)) => Ok(*outcome),
            Some(Err(message)) => Err(ApiError::NetworkOrServer(message.clone())),
            None => Err(ApiError::NetworkOrServer(format!(
                "no scripted HEAD for {path}"
            ))),
        }
    }

    fn get_json(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        self.record(RecordedCall {
            method: "GET",
            path: path.to_string(),
            json_body: None,
            form_body: None,
        });
        self.next_json(path)
    }

    fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        self.record(RecordedCall {
            method: "POST",
            path: path.to_string(),
            json_body: Some(body.clone()),
            form_body: None,
        });
        self.next_json(path)
    }

    fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<serde_json::Value, ApiError> {
        self.record(RecordedCall {
            method: "POST",
            path: path.to_string(),
            json_body: None,
            form_body: Some(form.to_vec()),
        });
        self.next_json(path)
    }

    fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        self.record(RecordedCall {
            method: "GET",
            path: path.to_string(),
            json_body: None,
            form_body: None,
        });
        let state = self.state.lock().unwrap();
        state
            .byte_responses
            .get(path)
            .cloned()
            .ok_or_else(|| ApiError::NetworkOrServer(format!("no scripted bytes for {path}")))
    }
}

/// Deterministic render engine: every page is US Letter, surfaces echo
/// the requested page and scale, pages beyond the document fail.
pub struct FakeEngine {
    pages: u32,
    page_size: PdfSize,
    render_delay: Duration,
}

impl FakeEngine {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            page_size: PdfSize::LETTER,
            render_delay: Duration::ZERO,
        }
    }

    pub fn with_page_size(mut self, size: PdfSize) -> Self {
        self.page_size = size;
        self
    }

    /// Make renders take a while, for queueing tests.
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    fn check_page(&self, page: u32) -> Result<(), WorkerFault> {
        if page >= 1 && page <= self.pages {
            Ok(())
        } else {
            Err(WorkerFault::generic(format!(
                "page {page} out of range 1..={}",
                self.pages
            )))
        }
    }
}

impl PageRenderEngine for FakeEngine {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page_size(&self, page: u32) -> Result<PdfSize, WorkerFault> {
        self.check_page(page)?;
        Ok(self.page_size)
    }

    fn render(&mut self, page: u32, scale: f64) -> Result<PageSurface, WorkerFault> {
        self.check_page(page)?;
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        Ok(PageSurface {
            page,
            scale,
            width_px: (self.page_size.width * scale).round() as u32,
            height_px: (self.page_size.height * scale).round() as u32,
            size: self.page_size,
        })
    }
}

pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
    let backend = TestBackend::new(width, height);
    Terminal::new(backend).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_transport_serves_queued_responses_in_order() {
        let transport = ScriptedTransport::new();
        transport.script_json("/x/", serde_json::json!({"n": 1}));
        transport.script_json("/x/", serde_json::json!({"n": 2}));

        assert_eq!(transport.get_json("/x/").unwrap()["n"], 1);
        assert_eq!(transport.get_json("/x/").unwrap()["n"], 2);
        // The last response keeps serving.
        assert_eq!(transport.get_json("/x/").unwrap()["n"], 2);
        assert_eq!(transport.calls_to("/x/").len(), 3);
    }

    #[test]
    fn unknown_paths_error() {
        let transport = ScriptedTransport::new();
        assert!(transport.get_json("/nope/").is_err());
    }

    #[test]
    fn fake_engine_scales_letter_pages() {
        let mut engine = FakeEngine::new(2);
        let surface = engine.render(1, 2.0).unwrap();
        assert_eq!(surface.width_px, 1224);
        assert_eq!(surface.height_px, 1584);
        assert!(engine.render(3, 1.0).is_err());
    }
}
