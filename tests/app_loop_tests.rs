//! Whole-program tests: the real run loop driven by a timed event
//! script, with the backend and the render engine faked out.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Result;
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use serde_json::json;

use templot::annotations::AnnotationId;
use templot::api::{ApiClient, ApiService, ProbeOutcome};
use templot::app::{App, LoadPhase, run_app_with_event_source};
use templot::event_source::{Event, EventSource, KeyCode, KeyModifiers, SimulatedEventSource};
use templot::geometry::PdfRect;
use templot::settings::Settings;
use templot::test_utils::{FakeEngine, ScriptedTransport};
use templot::widget::page_view::CellMetrics;

// Page cells start at (31, 1): 30 sidebar columns plus the document
// block border, drawn on an 80x40 test terminal.
const PAGE_X: u16 = 31;
const PAGE_Y: u16 = 1;

/// Event source that releases each scripted event at its offset from
/// start, sleeping through idle polls like a real terminal would.
struct TimedEvents {
    start: Instant,
    script: VecDeque<(Duration, Event)>,
}

impl TimedEvents {
    fn new(script: Vec<(u64, Event)>) -> Self {
        Self {
            start: Instant::now(),
            script: script
                .into_iter()
                .map(|(ms, event)| (Duration::from_millis(ms), event))
                .collect(),
        }
    }

    fn due(&self) -> bool {
        self.script
            .front()
            .is_some_and(|(at, _)| self.start.elapsed() >= *at)
    }
}

impl EventSource for TimedEvents {
    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        if self.due() {
            return Ok(true);
        }
        let wait = match self.script.front() {
            Some((at, _)) => at.saturating_sub(self.start.elapsed()).min(timeout),
            None => timeout,
        };
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        Ok(self.due())
    }

    fn read(&mut self) -> Result<Event> {
        Ok(self
            .script
            .pop_front()
            .map(|(_, event)| event)
            .unwrap_or_else(|| SimulatedEventSource::char_key('q')))
    }
}

fn boot_scripts(transport: &ScriptedTransport) {
    transport.script_head("/templates/42/pdf/", Ok(ProbeOutcome::Ok));
    transport.script_bytes("/templates/42/pdf/", b"%PDF-1.7 stub".to_vec());
    transport.script_json(
        "/templates/42/get-configuration-data/",
        json!({
            "fields": [{"id": 7, "name": "total", "page": 1,
                        "x": 10.0, "y": 5.0, "x1": 100.0, "y1": 40.0}],
            "tables": [],
            "python_functions": []
        }),
    );
    transport.script_json("/templates/42/dimensions/", json!({"status": "success"}));
}

fn test_app(transport: &ScriptedTransport) -> App {
    let api = ApiService::new(ApiClient::new(42, Box::new(transport.clone())));
    let mut app = App::with_engine_factory(
        42,
        Settings::default(),
        api,
        Box::new(|_| Ok(Box::new(FakeEngine::new(3)))),
    );
    app.set_cell_metrics(CellMetrics::UNIT);
    app
}

fn run_to_completion(app: &mut App, script: Vec<(u64, Event)>) {
    let backend = TestBackend::new(80, 40);
    let mut terminal = Terminal::new(backend).unwrap();
    let mut events = TimedEvents::new(script);
    run_app_with_event_source(&mut terminal, app, &mut events).unwrap();
}

fn chr(c: char) -> Event {
    SimulatedEventSource::char_key(c)
}

#[test]
fn loop_boots_renders_and_quits_cleanly() {
    let transport = ScriptedTransport::new();
    boot_scripts(&transport);
    let mut app = test_app(&transport);

    run_to_completion(&mut app, vec![(600, chr('q'))]);

    assert_eq!(*app.phase(), LoadPhase::Ready);
    assert!(app.should_quit);
    let surface = app.surface().unwrap();
    assert_eq!((surface.page, surface.scale), (1, 1.0));
    assert_eq!(app.store().len(), 1);
    assert_eq!(transport.calls_to("/templates/42/dimensions/").len(), 1);
}

#[test]
fn loop_applies_zoom_and_page_flip_keys() {
    let transport = ScriptedTransport::new();
    boot_scripts(&transport);
    let mut app = test_app(&transport);

    run_to_completion(
        &mut app,
        vec![(600, chr('+')), (700, chr('n')), (1400, chr('q'))],
    );

    assert_eq!(app.viewport().page(), 2);
    assert!((app.viewport().scale() - 1.25).abs() < f64::EPSILON);
    let surface = app.surface().unwrap();
    assert_eq!(surface.page, 2);
    assert!((surface.scale - 1.25).abs() < f64::EPSILON);
    // Page 2 holds no annotations, so the marker set is empty.
    assert!(app.markers().is_empty());
}

#[test]
fn drag_select_and_save_lands_on_the_server() {
    let transport = ScriptedTransport::new();
    boot_scripts(&transport);
    transport.script_json(
        "/templates/42/fields/create/",
        json!({"status": "success", "field_id": 17}),
    );
    let mut app = test_app(&transport);

    run_to_completion(
        &mut app,
        vec![
            (600, chr('s')),
            (620, SimulatedEventSource::mouse_down(PAGE_X + 10, PAGE_Y + 5)),
            (640, SimulatedEventSource::mouse_drag(PAGE_X + 30, PAGE_Y + 25)),
            (660, SimulatedEventSource::mouse_up(PAGE_X + 30, PAGE_Y + 25)),
            (700, chr('i')),
            (710, chr('n')),
            (720, chr('v')),
            (760, SimulatedEventSource::key_event(KeyCode::Enter, KeyModifiers::empty())),
            (1500, chr('q')),
        ],
    );

    let saved = app
        .store()
        .get(AnnotationId(17))
        .expect("saved field present after the server confirms");
    assert_eq!(saved.name, "inv");
    assert_eq!(saved.rect, PdfRect::new(10.0, 5.0, 20.0, 20.0));
    assert!(!app.has_active_popup(), "editor closes after a save");

    let creates = transport.calls_to("/templates/42/fields/create/");
    assert_eq!(creates.len(), 1);
    let form = creates[0].form_body.as_ref().unwrap();
    let get = |key: &str| {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    };
    assert_eq!(get("name"), "inv");
    assert_eq!(get("page"), "1");
    // x1/y1 carry width and height on the upsert form.
    assert_eq!(get("x1"), "20");
    assert_eq!(get("y1"), "20");
}
