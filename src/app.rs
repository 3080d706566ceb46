//! Application state and the event loop.
//!
//! Everything the UI shows lives here: the viewport machine, the
//! annotation store, the interaction state, both worker services and
//! the popup stack. Key and mouse events come in, viewport effects and
//! API requests go out, and responses are folded back in on every tick.
//! A response that no longer matches what the user is looking at is
//! dropped, never applied.

use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use log::{debug, info, warn};
use ratatui::{
    Frame, Terminal,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::annotations::{Annotation, AnnotationId, AnnotationStore, TableSettings};
use crate::api::{
    ApiError, ApiRequest, ApiResponse, ApiService, ExtractTablesRequest, ExtractedTable,
    OutcomePayload, PythonFunction, RegionRequest, RequestId, SaveFieldRequest, SaveImageRequest,
};
use crate::event_source::EventSource;
use crate::geometry::{PdfRect, ScreenPoint};
use crate::notification::NotificationManager;
use crate::overlay::{Marker, hit_marker, layout_markers};
use crate::render::{
    OutlineEngine, PageRenderEngine, PageSurface, RenderJob, RenderScheduler, RenderService,
    WorkerFault,
};
use crate::selection::{Interaction, InteractionMode, PointerOutcome};
use crate::settings::Settings;
use crate::theme::current_theme;
use crate::viewport::{Command, Effect, Viewport};
use crate::widget::confirm::render_confirm;
use crate::widget::edit_form::{EditForm, FormAction};
use crate::widget::help_popup::{HelpPopup, HelpPopupAction};
use crate::widget::images_popup::{ImagesAction, ImagesPopup};
use crate::widget::page_view::{CellMetrics, PageView};
use crate::widget::sidebar::Sidebar;
use crate::widget::status_line::StatusLine;
use crate::widget::table_form::{TableFormAction, TableSettingsForm};

/// Builds a render engine from fetched PDF bytes. The default makes an
/// [`OutlineEngine`]; tests and future rasterizers swap their own in.
pub type EngineFactory = Box<dyn Fn(&[u8]) -> Result<Box<dyn PageRenderEngine>, WorkerFault> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    /// Auth probe in flight; nothing else has been requested yet.
    Probing,
    /// Probe passed, waiting for the PDF and the configuration.
    Loading,
    Ready,
    /// Session cookie missing or expired.
    LoginRequired,
    /// The template id does not exist on this server.
    Missing(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPanel {
    Sidebar,
    Page,
}

enum Popup {
    Edit(EditForm),
    Table(TableSettingsForm),
    ConfirmDelete { id: AnnotationId, name: String },
    Images(ImagesPopup),
    Help(HelpPopup),
}

/// Request ids of operations awaiting a response. A response whose id
/// is not the one recorded here is stale and gets dropped.
#[derive(Default)]
struct PendingOps {
    probe: Option<RequestId>,
    pdf: Option<RequestId>,
    config: Option<RequestId>,
    save: Option<RequestId>,
    delete: Option<RequestId>,
    field: Option<RequestId>,
    text: Option<RequestId>,
    tables: Option<RequestId>,
    image_list: Option<RequestId>,
    image_extract: Option<RequestId>,
    image_save: Option<RequestId>,
    image_delete: Option<RequestId>,
}

impl PendingOps {
    fn busy_label(&self) -> Option<&'static str> {
        if self.save.is_some() {
            Some("saving")
        } else if self.delete.is_some() {
            Some("deleting")
        } else if self.text.is_some() {
            Some("extracting text")
        } else if self.tables.is_some() {
            Some("extracting tables")
        } else if self.field.is_some() {
            Some("loading field")
        } else if self.config.is_some() {
            Some("loading fields")
        } else if self.image_extract.is_some() || self.image_save.is_some() {
            Some("saving image")
        } else {
            None
        }
    }
}

/// What we sent with a create/update, kept until the server confirms so
/// the store can be updated from it. The store never changes on an
/// unconfirmed save.
struct PendingSave {
    request: SaveFieldRequest,
    editing: Option<i64>,
    open_table_settings: bool,
}

pub struct App {
    template_id: i64,
    pub settings: Settings,
    phase: LoadPhase,
    focus: FocusedPanel,
    pub should_quit: bool,

    viewport: Viewport,
    store: AnnotationStore,
    interaction: Interaction,
    markers: Vec<Marker>,
    show_overlays: bool,
    python_functions: Vec<PythonFunction>,

    api: ApiService,
    render: Option<RenderService>,
    engine_factory: EngineFactory,
    scheduler: RenderScheduler,
    surface: Option<PageSurface>,

    pending: PendingOps,
    pending_save: Option<PendingSave>,
    pub notifications: NotificationManager,

    popup: Option<Popup>,
    sidebar: Sidebar,
    page_input: Option<String>,
    metrics: CellMetrics,
    page_area: Option<Rect>,
}

impl App {
    pub fn new(template_id: i64, settings: Settings, api: ApiService) -> Self {
        Self::with_engine_factory(
            template_id,
            settings,
            api,
            Box::new(|bytes| Ok(Box::new(OutlineEngine::from_bytes(bytes)))),
        )
    }

    pub fn with_engine_factory(
        template_id: i64,
        settings: Settings,
        api: ApiService,
        engine_factory: EngineFactory,
    ) -> Self {
        let show_overlays = settings.show_overlays;
        let mut app = App {
            template_id,
            settings,
            phase: LoadPhase::Probing,
            focus: FocusedPanel::Page,
            should_quit: false,
            viewport: Viewport::new(),
            store: AnnotationStore::new(),
            interaction: Interaction::new(),
            markers: Vec::new(),
            show_overlays,
            python_functions: Vec::new(),
            api,
            render: None,
            engine_factory,
            scheduler: RenderScheduler::new(),
            surface: None,
            pending: PendingOps::default(),
            pending_save: None,
            notifications: NotificationManager::new(),
            popup: None,
            sidebar: Sidebar::new(),
            page_input: None,
            metrics: CellMetrics::DEFAULT,
            page_area: None,
        };
        app.pending.probe = Some(app.api.submit(ApiRequest::ProbeTemplate));
        app
    }

    pub fn set_cell_metrics(&mut self, metrics: CellMetrics) {
        self.metrics = metrics;
    }

    #[must_use]
    pub fn phase(&self) -> &LoadPhase {
        &self.phase
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[must_use]
    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    #[must_use]
    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn surface(&self) -> Option<&PageSurface> {
        self.surface.as_ref()
    }

    #[must_use]
    pub fn has_active_popup(&self) -> bool {
        self.popup.is_some()
    }

    // ---- event handling ------------------------------------------------

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.popup.is_some() {
            self.handle_popup_key(key);
            return;
        }

        // Keys that work in any panel.
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('?') => {
                self.popup = Some(Popup::Help(HelpPopup::new()));
                return;
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    FocusedPanel::Sidebar => FocusedPanel::Page,
                    FocusedPanel::Page => FocusedPanel::Sidebar,
                };
                return;
            }
            KeyCode::Char('o') => {
                self.show_overlays = !self.show_overlays;
                self.relayout();
                return;
            }
            KeyCode::Char('r') => {
                if self.phase == LoadPhase::Ready {
                    self.refresh_configuration();
                } else if matches!(
                    self.phase,
                    LoadPhase::LoginRequired | LoadPhase::Missing(_) | LoadPhase::Failed(_)
                ) {
                    // Retry from the top, e.g. after fixing the session
                    // cookie in the config file.
                    self.phase = LoadPhase::Probing;
                    self.pending.probe = Some(self.api.submit(ApiRequest::ProbeTemplate));
                }
                return;
            }
            KeyCode::Char('m') if self.phase == LoadPhase::Ready => {
                self.open_images_popup();
                return;
            }
            _ => {}
        }

        if self.phase != LoadPhase::Ready {
            return;
        }
        match self.focus {
            FocusedPanel::Sidebar => self.handle_sidebar_key(key),
            FocusedPanel::Page => self.handle_page_key(key),
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.sidebar.move_down(self.store.len()),
            KeyCode::Char('k') | KeyCode::Up => self.sidebar.move_up(),
            KeyCode::Enter => {
                if let Some(id) = self.sidebar_selection() {
                    self.open_editor_for(id);
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.sidebar_selection() {
                    self.confirm_delete(id);
                }
            }
            _ => {}
        }
    }

    fn handle_page_key(&mut self, key: KeyEvent) {
        // Page-number entry eats digits until enter or esc.
        if let Some(input) = &mut self.page_input {
            match key.code {
                KeyCode::Char(c) if c.is_ascii_digit() => {
                    input.push(c);
                    return;
                }
                KeyCode::Backspace => {
                    input.pop();
                    return;
                }
                KeyCode::Enter => {
                    let target = input.parse::<u32>().ok();
                    self.page_input = None;
                    match target {
                        Some(page) => self.apply_command(Command::GoToPage(page)),
                        None => debug!("page input did not parse, ignoring"),
                    }
                    return;
                }
                KeyCode::Esc => {
                    self.page_input = None;
                    return;
                }
                _ => return,
            }
        }

        match key.code {
            KeyCode::Char('n') | KeyCode::Char(']') | KeyCode::Right => {
                self.apply_command(Command::NextPage);
            }
            KeyCode::Char('p') | KeyCode::Char('[') | KeyCode::Left => {
                self.apply_command(Command::PrevPage);
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.apply_command(Command::ZoomIn),
            KeyCode::Char('-') => self.apply_command(Command::ZoomOut),
            KeyCode::Char(c) if c.is_ascii_digit() => {
                self.page_input = Some(c.to_string());
            }
            KeyCode::Char('s') => {
                if self.interaction.mode() == InteractionMode::SelectArea {
                    self.interaction.exit_to_browse();
                } else {
                    self.interaction.enter_select_area();
                }
            }
            KeyCode::Char('x') => self.interaction.toggle_vertical_lines(),
            KeyCode::Char('y') => self.interaction.toggle_horizontal_lines(),
            KeyCode::Char('c') => self.interaction.clear_lines(),
            KeyCode::Char('e') => match self.store.active().or_else(|| self.sidebar_selection()) {
                Some(id) => self.open_editor_for(id),
                None => self.notifications.warn("no field selected"),
            },
            KeyCode::Char('d') => {
                if let Some(id) = self.store.active().or_else(|| self.sidebar_selection()) {
                    self.confirm_delete(id);
                }
            }
            KeyCode::Esc => {
                if self.interaction.is_dragging() {
                    self.interaction.reset_transient();
                } else if self.interaction.mode() != InteractionMode::Browse {
                    self.interaction.exit_to_browse();
                } else if self.store.active().is_some() {
                    self.store.set_active(None);
                    self.relayout();
                }
            }
            _ => {}
        }
    }

    fn handle_popup_key(&mut self, key: KeyEvent) {
        let Some(popup) = &mut self.popup else {
            return;
        };
        match popup {
            Popup::Help(help) => {
                if let Some(HelpPopupAction::Close) = help.handle_key(key) {
                    self.popup = None;
                }
            }
            Popup::ConfirmDelete { id, .. } => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    let id = *id;
                    self.popup = None;
                    self.delete_field(id);
                }
                KeyCode::Char('n') | KeyCode::Esc => self.popup = None,
                _ => {}
            },
            Popup::Images(images) => {
                if let Some(action) = images.handle_key(key) {
                    self.handle_images_action(action);
                }
            }
            Popup::Edit(form) => {
                if let Some(action) = form.handle_key(key, self.python_functions.len()) {
                    self.handle_form_action(action);
                }
            }
            Popup::Table(form) => {
                if let Some(action) = form.handle_key(key) {
                    self.handle_table_action(action);
                }
            }
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.popup.is_some() {
            if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                self.handle_popup_outside_click(mouse.column, mouse.row);
            }
            return;
        }
        if self.phase != LoadPhase::Ready {
            return;
        }

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(idx) =
                    self.sidebar
                        .handle_mouse_click(mouse.column, mouse.row, self.store.len())
                {
                    self.focus = FocusedPanel::Sidebar;
                    if let Some(id) = self.annotation_id_at(idx) {
                        self.open_editor_for(id);
                    }
                    return;
                }
                let Some(point) = self.pointer_from_mouse(mouse.column, mouse.row) else {
                    return;
                };
                self.focus = FocusedPanel::Page;
                if self.interaction.mode() == InteractionMode::Browse {
                    match hit_marker(&self.markers, point) {
                        Some(id) => self.open_editor_for(id),
                        None => {
                            if self.store.active().is_some() {
                                self.store.set_active(None);
                                self.relayout();
                            }
                        }
                    }
                    return;
                }
                match self.interaction.pointer_down(point, self.viewport.scale()) {
                    Ok(PointerOutcome::LinePlaced(line)) => {
                        debug!("guide line placed: {}", line.label());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("pointer down rejected: {err}");
                        self.notifications.error(err.to_string());
                    }
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some(point) = self.clamped_pointer(mouse.column, mouse.row) {
                    self.interaction.pointer_move(point);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                // Releasing outside the page clips the drag to the page
                // edge instead of discarding it.
                let Some(point) = self.clamped_pointer(mouse.column, mouse.row) else {
                    self.interaction.reset_transient();
                    return;
                };
                match self.interaction.pointer_up(point, self.viewport.scale()) {
                    Ok(Some(rect)) => {
                        self.popup = Some(Popup::Edit(EditForm::for_new(self.viewport.page(), rect)));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!("pointer up rejected: {err}");
                        self.notifications.error(err.to_string());
                    }
                }
            }
            MouseEventKind::ScrollDown => match self.focus {
                FocusedPanel::Sidebar => self.sidebar.move_down(self.store.len()),
                FocusedPanel::Page => self.apply_command(Command::NextPage),
            },
            MouseEventKind::ScrollUp => match self.focus {
                FocusedPanel::Sidebar => self.sidebar.move_up(),
                FocusedPanel::Page => self.apply_command(Command::PrevPage),
            },
            _ => {}
        }
    }

    fn handle_popup_outside_click(&mut self, x: u16, y: u16) {
        let outside = match &self.popup {
            Some(Popup::Edit(form)) => form.is_outside_popup_area(x, y),
            Some(Popup::Table(form)) => form.is_outside_popup_area(x, y),
            Some(Popup::Images(images)) => images.is_outside_popup_area(x, y),
            Some(Popup::Help(help)) => help.is_outside_popup_area(x, y),
            Some(Popup::ConfirmDelete { .. }) => false,
            None => false,
        };
        if outside {
            self.popup = None;
        }
    }

    /// Maps a mouse cell inside the page area to screen pixels.
    fn pointer_from_mouse(&self, column: u16, row: u16) -> Option<ScreenPoint> {
        let area = self.page_area?;
        if column < area.x || column >= area.right() || row < area.y || row >= area.bottom() {
            return None;
        }
        let (x, y) = self.metrics.cell_to_px(area, column, row);
        Some(ScreenPoint::new(x, y))
    }

    /// Like [`Self::pointer_from_mouse`] but clamps cells outside the
    /// page back onto its nearest edge.
    fn clamped_pointer(&self, column: u16, row: u16) -> Option<ScreenPoint> {
        let area = self.page_area?;
        let column = column.clamp(area.x, area.right().saturating_sub(1));
        let row = row.clamp(area.y, area.bottom().saturating_sub(1));
        let (x, y) = self.metrics.cell_to_px(area, column, row);
        Some(ScreenPoint::new(x, y))
    }

    fn sidebar_selection(&self) -> Option<AnnotationId> {
        self.annotation_id_at(self.sidebar.selected)
    }

    fn annotation_id_at(&self, idx: usize) -> Option<AnnotationId> {
        self.store.list().nth(idx).map(|a| a.id)
    }

    // ---- viewport ------------------------------------------------------

    fn apply_command(&mut self, cmd: Command) {
        let effects = self.viewport.apply(cmd);
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RenderPage { page, scale } => self.schedule_render(page, scale),
                Effect::RelayoutOverlays => self.relayout(),
                Effect::ResetInteraction => self.interaction.reset_transient(),
                Effect::RevertPageInput => self.page_input = None,
                Effect::SyncDimensions(size) => {
                    self.api.submit(ApiRequest::SyncDimensions {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
        }
    }

    fn schedule_render(&mut self, page: u32, scale: f64) {
        let Some(render) = &self.render else {
            debug!("render requested before a document is loaded");
            return;
        };
        if let Some(job) = self.scheduler.request(RenderJob { page, scale }) {
            render.submit(job.page, job.scale);
        }
    }

    fn relayout(&mut self) {
        self.markers = if self.show_overlays {
            layout_markers(
                self.store.on_page(self.viewport.page()),
                self.viewport.page(),
                self.viewport.scale(),
                self.store.active(),
            )
        } else {
            Vec::new()
        };
    }

    // ---- outgoing operations -------------------------------------------

    fn refresh_configuration(&mut self) {
        if self.pending.config.is_some() {
            return;
        }
        self.pending.config = Some(self.api.submit(ApiRequest::FetchConfiguration));
    }

    fn open_images_popup(&mut self) {
        self.popup = Some(Popup::Images(ImagesPopup::new()));
        self.pending.image_list = Some(self.api.submit(ApiRequest::ListImages));
    }

    fn open_editor_for(&mut self, id: AnnotationId) {
        if self.pending.field.is_some() {
            return;
        }
        self.store.set_active(Some(id));
        self.relayout();
        self.pending.field = Some(self.api.submit(ApiRequest::FetchField { field_id: id.0 }));
    }

    fn confirm_delete(&mut self, id: AnnotationId) {
        let Some(ann) = self.store.get(id) else {
            return;
        };
        self.popup = Some(Popup::ConfirmDelete {
            id,
            name: ann.name.clone(),
        });
    }

    fn delete_field(&mut self, id: AnnotationId) {
        if self.pending.delete.is_some() {
            return;
        }
        self.pending.delete = Some(self.api.submit(ApiRequest::DeleteField { field_id: id.0 }));
    }

    fn handle_form_action(&mut self, action: FormAction) {
        match action {
            FormAction::Cancel => self.popup = None,
            FormAction::Save => self.save_from_form(),
            FormAction::ExtractText => self.extract_text_from_form(),
            FormAction::ExtractImages => self.save_image_from_form(),
            FormAction::AutoFill => {
                let size = self.viewport.page_size();
                if let Some(Popup::Edit(form)) = &mut self.popup {
                    form.set_rect(PdfRect::new(0.0, 0.0, size.width, size.height));
                }
            }
            FormAction::OpenTableSettings => self.open_table_settings(),
        }
    }

    fn save_from_form(&mut self) {
        if self.pending.save.is_some() {
            return;
        }
        let Some(Popup::Edit(form)) = &mut self.popup else {
            return;
        };
        let mut request = match form.build_request(&self.python_functions) {
            Ok(request) => request,
            Err(message) => {
                form.set_error(message);
                return;
            }
        };
        let editing = form.field_id;
        if request.is_table {
            let stored = editing
                .and_then(|id| self.store.get(AnnotationId(id)))
                .and_then(|a| a.table.as_ref())
                .map(|t| t.settings.clone());
            request.table_settings = Some(stored.unwrap_or_default());
            request.line_points = self.interaction.line_points(self.viewport.page_size());
        }
        form.saving = true;
        self.pending_save = Some(PendingSave {
            request: request.clone(),
            editing,
            open_table_settings: request.is_table && editing.is_none(),
        });
        self.pending.save = Some(match editing {
            Some(field_id) => self.api.submit(ApiRequest::UpdateField { field_id, request }),
            None => self.api.submit(ApiRequest::CreateField(request)),
        });
    }

    fn extract_text_from_form(&mut self) {
        if self.pending.text.is_some() {
            return;
        }
        let Some(Popup::Edit(form)) = &mut self.popup else {
            return;
        };
        let (rect, page) = match (form.rect(), form.page_number()) {
            (Ok(rect), Ok(page)) => (rect, page),
            (Err(message), _) | (_, Err(message)) => {
                form.set_error(message);
                return;
            }
        };
        self.pending.text = Some(
            self.api
                .submit(ApiRequest::ExtractText(RegionRequest::from_rect(rect, page))),
        );
    }

    /// Checks the region for embedded images, then stores the region as
    /// a template image when it has any.
    fn save_image_from_form(&mut self) {
        if self.pending.image_extract.is_some() || self.pending.image_save.is_some() {
            return;
        }
        let Some(Popup::Edit(form)) = &mut self.popup else {
            return;
        };
        let (rect, page) = match (form.rect(), form.page_number()) {
            (Ok(rect), Ok(page)) => (rect, page),
            (Err(message), _) | (_, Err(message)) => {
                form.set_error(message);
                return;
            }
        };
        self.pending.image_extract = Some(
            self.api
                .submit(ApiRequest::ExtractImages(RegionRequest::from_rect(rect, page))),
        );
    }

    fn open_table_settings(&mut self) {
        let Some(Popup::Edit(form)) = &self.popup else {
            return;
        };
        if !form.is_table {
            self.notifications.warn("not a table field");
            return;
        }
        let Some(field_id) = form.field_id else {
            if let Some(Popup::Edit(form)) = &mut self.popup {
                form.set_error("save the field first, then configure the table");
            }
            return;
        };
        let settings = self
            .store
            .get(AnnotationId(field_id))
            .and_then(|a| a.table.as_ref())
            .map(|t| t.settings.clone())
            .unwrap_or_default();
        self.popup = Some(Popup::Table(TableSettingsForm::new(field_id, settings)));
    }

    fn handle_table_action(&mut self, action: TableFormAction) {
        match action {
            TableFormAction::Close => {
                // Keep the edited settings in memory; they persist with
                // the next save.
                if let Some(Popup::Table(form)) = &self.popup {
                    let settings = form.settings.clone();
                    let id = AnnotationId(form.field_id);
                    if let Some(details) =
                        self.store.get_mut(id).and_then(|a| a.table.as_mut())
                    {
                        details.settings = settings;
                    }
                }
                self.popup = None;
            }
            TableFormAction::Extract => self.extract_tables(),
            TableFormAction::SaveSettings => self.save_table_settings(),
        }
    }

    fn extract_tables(&mut self) {
        if self.pending.tables.is_some() {
            return;
        }
        let page_size = self.viewport.page_size();
        let line_points = self.interaction.line_points(page_size);
        let Some(Popup::Table(form)) = &mut self.popup else {
            return;
        };
        let Some(ann) = self.store.get(AnnotationId(form.field_id)) else {
            self.notifications.error("field no longer exists");
            return;
        };
        let request =
            ExtractTablesRequest::new(ann.rect, ann.page, form.settings.clone(), line_points);
        form.extracting = true;
        self.pending.tables = Some(self.api.submit(ApiRequest::ExtractTables(request)));
    }

    fn save_table_settings(&mut self) {
        if self.pending.save.is_some() {
            return;
        }
        let Some(Popup::Table(form)) = &self.popup else {
            return;
        };
        let id = form.field_id;
        let settings = form.settings.clone();
        let Some(ann) = self.store.get(AnnotationId(id)) else {
            self.notifications.error("field no longer exists");
            return;
        };
        let request = SaveFieldRequest {
            name: ann.name.clone(),
            page: ann.page,
            rect: ann.rect,
            is_table: true,
            python_function: ann.python_function.clone(),
            table_settings: Some(settings),
            line_points: self.interaction.line_points(self.viewport.page_size()),
        };
        self.pending_save = Some(PendingSave {
            request: request.clone(),
            editing: Some(id),
            open_table_settings: false,
        });
        self.pending.save = Some(self.api.submit(ApiRequest::UpdateField {
            field_id: id,
            request,
        }));
    }

    fn handle_images_action(&mut self, action: ImagesAction) {
        match action {
            ImagesAction::Close => self.popup = None,
            ImagesAction::Refresh => {
                if self.pending.image_list.is_none() {
                    if let Some(Popup::Images(images)) = &mut self.popup {
                        images.loading = true;
                    }
                    self.pending.image_list = Some(self.api.submit(ApiRequest::ListImages));
                }
            }
            ImagesAction::Delete(image_id) => {
                if self.pending.image_delete.is_none() {
                    self.pending.image_delete =
                        Some(self.api.submit(ApiRequest::DeleteImage { image_id }));
                }
            }
        }
    }

    // ---- response handling ---------------------------------------------

    /// Polls both workers and the notification clock. Returns true when
    /// anything changed and the screen should redraw.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;
        for response in self.api.poll_responses() {
            self.handle_api_response(response);
            changed = true;
        }
        if let Some(render) = &self.render {
            let responses = render.poll_responses();
            for response in responses {
                self.handle_render_response(response.page, response.scale, response.outcome);
                changed = true;
            }
        }
        let had = self.notifications.current().is_some();
        self.notifications.sweep();
        if had != self.notifications.current().is_some() {
            changed = true;
        }
        changed
    }

    fn handle_render_response(
        &mut self,
        page: u32,
        scale: f64,
        outcome: Result<PageSurface, WorkerFault>,
    ) {
        if let Some(next) = self.scheduler.finish() {
            if let Some(render) = &self.render {
                render.submit(next.page, next.scale);
            }
        }
        match outcome {
            Ok(surface) => {
                // A surface for anything but the current page and scale
                // is stale output from a superseded request.
                if surface.page != self.viewport.page()
                    || (surface.scale - self.viewport.scale()).abs() > f64::EPSILON
                {
                    debug!(
                        "discarding stale surface (page {} at {:.2})",
                        surface.page, surface.scale
                    );
                    return;
                }
                self.surface = Some(surface);
                let effects = self.viewport.apply(Command::SetPageSize(surface.size));
                self.apply_effects(effects);
            }
            Err(fault) => {
                warn!("render of page {page} at {scale:.2} failed: {fault}");
                self.notifications.error(format!("render failed: {fault}"));
            }
        }
    }

    fn handle_api_response(&mut self, response: ApiResponse) {
        let id = response.id;
        match response.payload {
            OutcomePayload::Probe(result) => {
                if self.pending.probe.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(()) => {
                        self.phase = LoadPhase::Loading;
                        self.pending.pdf = Some(self.api.submit(ApiRequest::FetchPdf));
                        self.refresh_configuration();
                    }
                    Err(err) if err.is_auth() => self.phase = LoadPhase::LoginRequired,
                    Err(ApiError::NotFound(what)) => self.phase = LoadPhase::Missing(what),
                    Err(err) => self.phase = LoadPhase::Failed(err.to_string()),
                }
            }
            OutcomePayload::Pdf(result) => {
                if self.pending.pdf.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(bytes) => self.attach_document(&bytes),
                    Err(err) if err.is_auth() => self.phase = LoadPhase::LoginRequired,
                    Err(err) => self.phase = LoadPhase::Failed(err.to_string()),
                }
            }
            OutcomePayload::DimensionsSynced(result) => match result {
                Ok(()) => debug!("page dimensions synced"),
                Err(err) => warn!("dimension sync failed: {err}"),
            },
            OutcomePayload::Configuration(result) => {
                if self.pending.config.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(data) => {
                        self.python_functions = data.python_functions.clone();
                        let annotations = data.into_annotations();
                        info!("configuration loaded: {} fields", annotations.len());
                        self.store.replace_all(annotations);
                        self.sidebar.clamp(self.store.len());
                        self.relayout();
                    }
                    Err(err) => self.fail_operation("loading fields", err),
                }
            }
            OutcomePayload::Text(result) => {
                if self.pending.text.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(text) => {
                        if let Some(Popup::Edit(form)) = &mut self.popup {
                            form.extracted_text = Some(text.clone());
                            if let Some(field_id) = form.field_id {
                                if let Some(ann) = self.store.get_mut(AnnotationId(field_id)) {
                                    ann.extracted_text = Some(text);
                                }
                            }
                        }
                        self.notifications.info("text extracted");
                    }
                    Err(err) => self.fail_operation("extract text", err),
                }
            }
            OutcomePayload::Field(result) => {
                if self.pending.field.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(record) => {
                        let ann = record.into_annotation();
                        let ann_id = ann.id;
                        let page = ann.page;
                        self.store.upsert(ann);
                        self.store.set_active(Some(ann_id));
                        if page != self.viewport.page() {
                            self.apply_command(Command::GoToPage(page));
                        }
                        self.relayout();
                        let ann = self.store.get(ann_id).cloned();
                        if let Some(ann) = ann {
                            self.popup = Some(Popup::Edit(EditForm::for_annotation(
                                &ann,
                                &self.python_functions,
                            )));
                        }
                    }
                    Err(err) => self.fail_operation("loading field", err),
                }
            }
            OutcomePayload::FieldCreated(result) => {
                if self.pending.save.take_if(|p| *p == id).is_none() {
                    return;
                }
                let Some(stash) = self.pending_save.take() else {
                    return;
                };
                match result {
                    Ok(new_id) => self.absorb_saved_field(AnnotationId(new_id), stash),
                    Err(err) => self.fail_save(err),
                }
            }
            OutcomePayload::FieldUpdated { field_id, result } => {
                if self.pending.save.take_if(|p| *p == id).is_none() {
                    return;
                }
                let Some(stash) = self.pending_save.take() else {
                    return;
                };
                match result {
                    Ok(()) => self.absorb_saved_field(AnnotationId(field_id), stash),
                    Err(err) => self.fail_save(err),
                }
            }
            OutcomePayload::FieldDeleted { field_id, result } => {
                if self.pending.delete.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(()) => {
                        let removed = self.store.remove(AnnotationId(field_id));
                        self.sidebar.clamp(self.store.len());
                        self.relayout();
                        match removed {
                            Some(ann) => self.notifications.info(format!("deleted {}", ann.name)),
                            None => self.notifications.info("field deleted"),
                        }
                        // Close any editor that was showing the deleted field.
                        let editing_it = match &self.popup {
                            Some(Popup::Edit(form)) => form.field_id == Some(field_id),
                            Some(Popup::Table(form)) => form.field_id == field_id,
                            _ => false,
                        };
                        if editing_it {
                            self.popup = None;
                        }
                    }
                    Err(err) => self.fail_operation("delete", err),
                }
            }
            OutcomePayload::Tables(result) => {
                if self.pending.tables.take_if(|p| *p == id).is_none() {
                    return;
                }
                let settings = match &mut self.popup {
                    Some(Popup::Table(form)) => {
                        form.extracting = false;
                        Some(form.settings.clone())
                    }
                    _ => None,
                };
                match result {
                    Ok(tables) => self.absorb_extracted_tables(tables, settings),
                    Err(err) => self.fail_operation("extract tables", err),
                }
            }
            OutcomePayload::Images(result) => {
                if self.pending.image_list.take_if(|p| *p == id).is_some() {
                    match result {
                        Ok(images) => {
                            if let Some(Popup::Images(popup)) = &mut self.popup {
                                popup.set_images(images);
                            }
                        }
                        Err(err) => self.fail_operation("loading images", err),
                    }
                } else if self.pending.image_extract.take_if(|p| *p == id).is_some() {
                    match result {
                        Ok(images) if images.is_empty() => {
                            self.notifications.warn("no images found in the region");
                        }
                        Ok(images) => self.save_region_image(images.len()),
                        Err(err) => self.fail_operation("extract images", err),
                    }
                }
            }
            OutcomePayload::ImageSaved(result) => {
                if self.pending.image_save.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(()) => self.notifications.info("image saved"),
                    Err(err) => self.fail_operation("save image", err),
                }
            }
            OutcomePayload::ImageDeleted { image_id, result } => {
                if self.pending.image_delete.take_if(|p| *p == id).is_none() {
                    return;
                }
                match result {
                    Ok(()) => {
                        if let Some(Popup::Images(popup)) = &mut self.popup {
                            popup.images.retain(|img| img.id != image_id);
                        }
                        self.notifications.info("image deleted");
                    }
                    Err(err) => self.fail_operation("delete image", err),
                }
            }
        }
    }

    fn attach_document(&mut self, bytes: &[u8]) {
        let engine = match (self.engine_factory)(bytes) {
            Ok(engine) => engine,
            Err(fault) => {
                self.phase = LoadPhase::Failed(fault.to_string());
                return;
            }
        };
        let service = match RenderService::new(engine) {
            Ok(service) => service,
            Err(fault) => {
                self.phase = LoadPhase::Failed(fault.to_string());
                return;
            }
        };
        let document = service.document_info();
        info!(
            "document attached: {} pages, first page {:.0}x{:.0}",
            document.page_count, document.first_page_size.width, document.first_page_size.height
        );
        self.render = Some(service);
        self.scheduler.reset();
        self.surface = None;
        self.phase = LoadPhase::Ready;

        let initial_scale = Viewport::clamp_scale(self.settings.default_scale);
        let effects = self.viewport.apply(Command::LoadDocument {
            total_pages: document.page_count,
            initial_scale,
        });
        self.apply_effects(effects);
        let effects = self
            .viewport
            .apply(Command::SetPageSize(document.first_page_size));
        self.apply_effects(effects);
    }

    fn absorb_saved_field(&mut self, id: AnnotationId, stash: PendingSave) {
        let req = stash.request;
        let mut ann = if req.is_table {
            Annotation::table(id, req.name.clone(), req.page, req.rect)
        } else {
            Annotation::field(id, req.name.clone(), req.page, req.rect)
        };
        ann.python_function = req.python_function.clone();
        // An update must not wipe server-side state we already cached.
        if let Some(existing) = self.store.get(id) {
            ann.extracted_text = existing.extracted_text.clone();
            if req.is_table {
                if let (Some(details), Some(old)) = (ann.table.as_mut(), existing.table.as_ref()) {
                    details.grid = old.grid.clone();
                }
            }
        }
        if let Some(details) = ann.table.as_mut() {
            if let Some(settings) = req.table_settings.clone() {
                details.settings = settings;
            }
            details.line_points = req.line_points.clone();
        }
        self.store.upsert(ann);
        self.store.set_active(Some(id));
        self.sidebar.clamp(self.store.len());
        self.relayout();
        self.notifications.info(format!("saved {}", req.name));

        if let Some(Popup::Edit(form)) = &mut self.popup {
            form.saving = false;
        }
        if stash.open_table_settings {
            let settings = req.table_settings.unwrap_or_default();
            self.popup = Some(Popup::Table(TableSettingsForm::new(id.0, settings)));
        } else if matches!(self.popup, Some(Popup::Edit(_))) {
            self.popup = None;
        }
    }

    fn absorb_extracted_tables(
        &mut self,
        tables: Vec<ExtractedTable>,
        settings: Option<TableSettings>,
    ) {
        let Some(Popup::Table(form)) = &self.popup else {
            return;
        };
        let id = AnnotationId(form.field_id);
        let Some(first) = tables.first() else {
            self.notifications.warn("no tables found in the region");
            return;
        };
        if let Some(ann) = self.store.get_mut(id) {
            ann.rect = first.bbox_rect();
            if let Some(details) = ann.table.as_mut() {
                details.grid = Some(first.to_grid());
                if let Some(settings) = settings {
                    details.settings = settings;
                }
            }
        }
        self.relayout();
        let count = tables.len();
        if count == 1 {
            self.notifications.info("1 table extracted");
        } else {
            self.notifications
                .info(format!("{count} tables extracted, showing the first"));
        }
    }

    fn save_region_image(&mut self, found: usize) {
        let Some(Popup::Edit(form)) = &mut self.popup else {
            return;
        };
        let (rect, page) = match (form.rect(), form.page_number()) {
            (Ok(rect), Ok(page)) => (rect, page),
            _ => return,
        };
        let name = if form.name().is_empty() {
            format!("page-{page}-image")
        } else {
            form.name().to_string()
        };
        self.notifications
            .info(format!("{found} image(s) in region, saving"));
        self.pending.image_save = Some(self.api.submit(ApiRequest::SaveImage(SaveImageRequest {
            name,
            page,
            x: rect.x,
            y: rect.y,
            x1: rect.right(),
            y1: rect.bottom(),
        })));
    }

    fn fail_save(&mut self, err: ApiError) {
        if err.is_auth() {
            self.phase = LoadPhase::LoginRequired;
            return;
        }
        if let Some(Popup::Edit(form)) = &mut self.popup {
            form.saving = false;
            form.set_error(err.to_string());
        } else {
            self.notifications.error(format!("save failed: {err}"));
        }
    }

    fn fail_operation(&mut self, what: &str, err: ApiError) {
        if err.is_auth() {
            self.phase = LoadPhase::LoginRequired;
            return;
        }
        warn!("{what} failed: {err}");
        self.notifications.error(format!("{what} failed: {err}"));
        if let Some(Popup::Table(form)) = &mut self.popup {
            form.extracting = false;
        }
    }

    // ---- drawing -------------------------------------------------------

    pub fn draw(&mut self, f: &mut Frame) {
        let area = f.area();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);

        if self.phase == LoadPhase::Ready {
            self.draw_workspace(f, rows[0]);
        } else {
            self.draw_phase_screen(f, rows[0]);
        }

        let status = StatusLine {
            page: self.viewport.page(),
            total_pages: self.viewport.total_pages(),
            scale: self.viewport.scale(),
            mode: self.interaction.mode(),
            page_input: self.page_input.as_deref(),
            busy: self.pending.busy_label(),
            overlays_visible: self.show_overlays,
            notification: self.notifications.current(),
        };
        status.render(f, rows[1]);

        match &mut self.popup {
            Some(Popup::Help(help)) => help.render(f, area),
            Some(Popup::Edit(form)) => form.render(f, area, &self.python_functions),
            Some(Popup::Table(form)) => {
                let grid = self
                    .store
                    .get(AnnotationId(form.field_id))
                    .and_then(|a| a.table.as_ref())
                    .and_then(|t| t.grid.clone());
                form.render(f, area, grid.as_ref());
            }
            Some(Popup::Images(images)) => images.render(f, area),
            Some(Popup::ConfirmDelete { name, .. }) => {
                let message = format!("delete field {name:?}?");
                render_confirm(f, area, "delete field", &message);
            }
            None => {}
        }
    }

    fn draw_workspace(&mut self, f: &mut Frame, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(30), Constraint::Min(20)])
            .split(area);

        let items: Vec<&Annotation> = self.store.list().collect();
        self.sidebar.render(
            f,
            columns[0],
            self.focus == FocusedPanel::Sidebar,
            &items,
            self.store.active(),
        );

        let placeholder = match &self.phase {
            LoadPhase::Ready => "rendering…",
            _ => "no document",
        };
        let view = PageView {
            surface: self.surface.as_ref(),
            markers: &self.markers,
            selection: self.interaction.selection_box(),
            guides: self.interaction.lines(),
            scale: self.viewport.scale(),
            metrics: self.metrics,
            focused: self.focus == FocusedPanel::Page,
            placeholder,
        };
        let page_area = view.render(f, columns[1]);
        self.page_area = (page_area.width > 0).then_some(page_area);
    }

    fn draw_phase_screen(&self, f: &mut Frame, area: Rect) {
        let palette = current_theme();
        let lines: Vec<Line> = match &self.phase {
            LoadPhase::Probing => vec![Line::from(format!(
                "probing template {} at {}…",
                self.template_id, self.settings.server_url
            ))],
            LoadPhase::Loading => vec![Line::from("loading document…")],
            LoadPhase::LoginRequired => vec![
                Line::from(Span::styled(
                    "login required",
                    Style::default().fg(palette.base_08),
                )),
                Line::default(),
                Line::from(format!("server: {}", self.settings.server_url)),
                Line::from("sign in with a browser, then copy the sessionid cookie and"),
                Line::from("csrf token into the session_cookie / csrf_token settings."),
            ],
            LoadPhase::Missing(what) => vec![Line::from(Span::styled(
                format!("not found: {what}"),
                Style::default().fg(palette.base_08),
            ))],
            LoadPhase::Failed(message) => vec![Line::from(Span::styled(
                format!("failed: {message}"),
                Style::default().fg(palette.base_08),
            ))],
            LoadPhase::Ready => Vec::new(),
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.base_03));
        let body = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block)
            .style(Style::default().fg(palette.base_05));
        f.render_widget(body, area);
    }
}

pub fn run_app_with_event_source<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();
    let mut first_render = true;
    loop {
        let mut events_processed = 0;
        while event_source.poll(Duration::from_millis(0))? && events_processed < 50 {
            let event = event_source.read()?;
            events_processed += 1;
            app.handle_event(event);
            if app.should_quit {
                break;
            }
        }

        let mut needs_redraw = events_processed > 0;
        if first_render {
            needs_redraw = true;
            first_render = false;
        }
        if last_tick.elapsed() >= tick_rate {
            if app.tick() {
                needs_redraw = true;
            }
            last_tick = Instant::now();
        }

        if needs_redraw {
            terminal.draw(|f| app.draw(f))?;
        }

        // If no events were processed, wait a bit to avoid busy-waiting
        if events_processed == 0 {
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));
            let _ = event_source.poll(timeout);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
