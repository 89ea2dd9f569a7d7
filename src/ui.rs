//! Interactive flow canvas (feature = "egui").
//!
//! The window has a palette on the left, the canvas in the middle and the
//! property panel of the selected node on the right. All canvas input is
//! translated into [`EditorEvent`]s for the session; this module holds no
//! editing logic of its own. Saves run on a worker thread so the canvas stays
//! responsive while the store is written.

#![cfg(feature = "egui")]

use std::sync::mpsc::{Receiver, TryRecvError, channel};

use anyhow::Result;
use eframe::egui::{
    self, Align2, Color32, FontId, Pos2, Rect as EguiRect, Sense, Shape, Stroke, Vec2,
};
use tracing::warn;

use crate::editor::controller::{EditorEvent, Feedback, Key, Modifiers, NodeAction, PointerButton};
use crate::editor::palette::{PaletteDrag, palette_by_category};
use crate::editor::properties::{PropertyEdit, insert_token};
use crate::editor::session::{EditorSession, SaveStatus};
use crate::error::PersistenceError;
use crate::geometry::{NodeLayout, Point, Rect};
use crate::model::{
    ConditionRule, HttpMethod, IntentRoute, MatchMode, MediaKind, MediaRef, Node,
    NodeKind, NodeType, TagAction, TriggerSubtype,
};
use crate::persistence::{FsFlowStore, PersistenceAdapter, SaveJob};

const HEADER_BUTTON: f32 = 14.0;

/// Open the editor window and block until it is closed.
pub fn run(session: EditorSession, store: FsFlowStore) -> Result<()> {
    let title = format!("leadflow: {}", session.name());
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::light());
            Ok(Box::new(FlowEditorApp::new(session, store)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

struct PendingSave {
    job: SaveJob,
    rx: Receiver<Result<crate::model::Flow, PersistenceError>>,
}

pub struct FlowEditorApp {
    session: EditorSession,
    store: FsFlowStore,
    saving: Option<PendingSave>,
    palette_query: String,
    last_refusal: Option<String>,
}

impl FlowEditorApp {
    pub fn new(session: EditorSession, store: FsFlowStore) -> Self {
        Self {
            session,
            store,
            saving: None,
            palette_query: String::new(),
            last_refusal: None,
        }
    }

    fn start_save(&mut self, job: SaveJob) {
        let (tx, rx) = channel();
        let store = self.store.clone();
        let flow = job.flow.clone();
        std::thread::spawn(move || {
            let mut adapter = PersistenceAdapter::new(store);
            let _ = tx.send(adapter.save(&flow));
        });
        self.saving = Some(PendingSave { job, rx });
    }

    fn request_save(&mut self) {
        if let Some(job) = self.session.request_save() {
            self.start_save(job);
        }
    }

    fn poll_save(&mut self) {
        let Some(pending) = &self.saving else { return };
        let result = match pending.rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(PersistenceError::PersistenceUnavailable(
                "save worker stopped".to_string(),
            )),
        };
        let Some(pending) = self.saving.take() else { return };
        if let Some(next) = self.session.finish_save(&pending.job, result) {
            self.start_save(next);
        }
    }

    fn record(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::ConnectionRefused(e) | Feedback::Failed(e) => {
                self.last_refusal = Some(e.to_string());
            }
            Feedback::Ignored | Feedback::Tracking => {}
            _ => self.last_refusal = None,
        }
    }
}

impl eframe::App for FlowEditorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_save();
        if self.saving.is_some() {
            ctx.request_repaint();
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| toolbar(self, ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| status_bar(self, ui));
        egui::SidePanel::left("palette")
            .resizable(false)
            .default_width(180.0)
            .show(ctx, |ui| palette_panel(self, ui));
        egui::SidePanel::right("properties")
            .default_width(280.0)
            .show(ctx, |ui| property_panel(&mut self.session, ui));
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(Color32::from_rgb(246, 247, 249)))
            .show(ctx, |ui| canvas(self, ui));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Panels
// ────────────────────────────────────────────────────────────────────────────

fn toolbar(app: &mut FlowEditorApp, ui: &mut egui::Ui) {
    ui.horizontal(|ui| {
        let mut name = app.session.name().to_string();
        if ui
            .add(egui::TextEdit::singleline(&mut name).desired_width(220.0))
            .changed()
        {
            app.session.set_name(name);
        }
        ui.separator();
        if ui
            .add_enabled(app.session.history.can_undo(), egui::Button::new("Undo"))
            .clicked()
        {
            app.session.undo();
        }
        if ui
            .add_enabled(app.session.history.can_redo(), egui::Button::new("Redo"))
            .clicked()
        {
            app.session.redo();
        }
        ui.separator();
        let save_label = match app.session.save_status() {
            SaveStatus::Saving | SaveStatus::Retrying(_) => "Saving…",
            SaveStatus::Failed(_) => "Retry save",
            _ => "Save",
        };
        if ui.button(save_label).clicked() {
            app.request_save();
        }
        let status = app.session.status();
        ui.label(format!("{:?}", status));
    });
}

fn status_bar(app: &mut FlowEditorApp, ui: &mut egui::Ui) {
    ui.horizontal(|ui| {
        match app.session.save_status() {
            SaveStatus::Saved => ui.label("All changes saved"),
            SaveStatus::Unsaved => ui.label("Unsaved changes"),
            SaveStatus::Saving => ui.label("Saving…"),
            SaveStatus::Retrying(e) => {
                ui.colored_label(Color32::YELLOW, format!("Save failed, retrying: {}", e))
            }
            SaveStatus::Failed(e) => ui.colored_label(Color32::RED, format!("Save failed: {}", e)),
        };
        ui.separator();
        let issues = app.session.graph.validate();
        let errors = issues.iter().filter(|i| i.is_error()).count();
        if errors > 0 {
            ui.colored_label(Color32::RED, format!("{} error(s)", errors));
        }
        if issues.len() > errors {
            ui.colored_label(
                Color32::from_rgb(180, 120, 0),
                format!("{} warning(s)", issues.len() - errors),
            );
        }
        if let Some(r) = &app.last_refusal {
            ui.separator();
            ui.colored_label(Color32::from_rgb(200, 60, 60), r.as_str());
        }
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(format!("{}%", (app.session.viewport.scale * 100.0).round() as i32));
        });
    });
}

fn palette_panel(app: &mut FlowEditorApp, ui: &mut egui::Ui) {
    ui.heading("Nodes");
    ui.add(egui::TextEdit::singleline(&mut app.palette_query).hint_text("Search…"));
    egui::ScrollArea::vertical().show(ui, |ui| {
        for category in palette_by_category() {
            let items: Vec<_> = category
                .items
                .iter()
                .filter(|i| i.matches_query(&app.palette_query))
                .collect();
            if items.is_empty() {
                continue;
            }
            ui.label(egui::RichText::new(category.name.as_str()).strong());
            for item in items {
                let id = egui::Id::new(("palette", item.label.as_str()));
                ui.dnd_drag_source(id, item.drag, |ui| {
                    ui.add(egui::Label::new(item.label.as_str()).sense(Sense::click_and_drag()))
                        .on_hover_text(item.description.as_str());
                });
            }
            ui.add_space(6.0);
        }
    });
}

fn property_panel(session: &mut EditorSession, ui: &mut egui::Ui) {
    let Some(node) = session.selected_node().cloned() else {
        ui.label("Select a node to edit its properties.");
        return;
    };
    ui.heading(node.node_type().as_str());
    ui.separator();

    let mut edits: Vec<PropertyEdit> = Vec::new();
    node_fields(session, &node, ui, &mut edits);

    for problem in session.field_problems() {
        ui.colored_label(Color32::from_rgb(180, 120, 0), problem.message);
    }

    for edit in edits {
        if let Err(e) = session.apply_edit(node.id, edit) {
            warn!(node = %node.id, error = %e, "property edit rejected");
        }
    }
}

fn node_fields(session: &EditorSession, node: &Node, ui: &mut egui::Ui, edits: &mut Vec<PropertyEdit>) {
    match &node.kind {
        NodeKind::Trigger(p) => {
            let mut subtype = p.subtype;
            ui.horizontal(|ui| {
                ui.radio_value(&mut subtype, TriggerSubtype::NewContact, "New contact");
                ui.radio_value(&mut subtype, TriggerSubtype::Keyword, "Keyword");
            });
            if subtype != p.subtype {
                edits.push(PropertyEdit::SetTriggerSubtype(subtype));
            }
            if subtype == TriggerSubtype::Keyword {
                let mut text = p.keywords.join(", ");
                ui.label("Keywords (comma separated)");
                if ui.text_edit_singleline(&mut text).changed() {
                    edits.push(PropertyEdit::SetKeywords(
                        text.split(',').map(str::to_string).collect(),
                    ));
                }
            }
        }
        NodeKind::Message(p) => {
            let mut text = p.text.clone();
            ui.label("Message");
            if ui.text_edit_multiline(&mut text).changed() {
                edits.push(PropertyEdit::SetMessageText(text.clone()));
            }
            ui.horizontal_wrapped(|ui| {
                for token in session.variables.tokens() {
                    if ui.small_button(token.as_str()).clicked() {
                        let name = token.trim_start_matches("{{").trim_end_matches("}}");
                        let end = text.chars().count();
                        insert_token(&mut text, end, name);
                        edits.push(PropertyEdit::SetMessageText(text.clone()));
                    }
                }
            });
            let mut has_media = p.media.is_some();
            if ui.checkbox(&mut has_media, "Attach media").changed() {
                edits.push(PropertyEdit::SetMedia(has_media.then(MediaRef::default)));
            }
            if let Some(media) = &p.media {
                let mut m = media.clone();
                egui::ComboBox::from_id_salt("media_kind")
                    .selected_text(format!("{:?}", m.kind))
                    .show_ui(ui, |ui| {
                        for k in [MediaKind::Image, MediaKind::Audio, MediaKind::Video, MediaKind::Document] {
                            ui.selectable_value(&mut m.kind, k, format!("{:?}", k));
                        }
                    });
                ui.text_edit_singleline(&mut m.url);
                if &m != media {
                    edits.push(PropertyEdit::SetMedia(Some(m)));
                }
            }
        }
        NodeKind::Wait(p) => {
            let mut limited = p.timeout_seconds.is_some();
            let mut secs = p.timeout_seconds.unwrap_or(3600);
            ui.checkbox(&mut limited, "Time out");
            if limited {
                ui.add(egui::DragValue::new(&mut secs).range(1..=604_800).suffix(" s"));
            }
            let value = limited.then_some(secs);
            if value != p.timeout_seconds {
                edits.push(PropertyEdit::SetWaitTimeout(value));
            }
        }
        NodeKind::Condition(p) => {
            for (i, rule) in p.rules.iter().enumerate() {
                ui.horizontal(|ui| {
                    ui.label(format!("{}.", i + 1));
                    if let Some(edited) = rule_editor(ui, i, rule) {
                        edits.push(PropertyEdit::UpdateConditionRow { index: i, rule: edited });
                    }
                    if ui.small_button("✕").clicked() {
                        edits.push(PropertyEdit::RemoveConditionRow(i));
                    }
                });
            }
            if ui.button("Add rule").clicked() {
                edits.push(PropertyEdit::AddConditionRow(ConditionRule::TextMatch {
                    text: String::new(),
                    mode: MatchMode::Contains,
                }));
            }
        }
        NodeKind::Intent(p) => {
            for (i, route) in p.routes.iter().enumerate() {
                ui.group(|ui| {
                    let mut r = route.clone();
                    ui.horizontal(|ui| {
                        ui.text_edit_singleline(&mut r.name);
                        if ui.small_button("✕").clicked() {
                            edits.push(PropertyEdit::RemoveIntentRoute(i));
                        }
                    });
                    let mut phrases = r.phrases.join(", ");
                    if ui.text_edit_singleline(&mut phrases).changed() {
                        r.phrases = phrases
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect();
                    }
                    if &r != route {
                        edits.push(PropertyEdit::UpdateIntentRoute { index: i, route: r });
                    }
                });
            }
            ui.label("Unmatched replies leave through the last output.");
            if ui.button("Add route").clicked() {
                edits.push(PropertyEdit::AddIntentRoute(IntentRoute {
                    name: format!("Route {}", p.routes.len() + 1),
                    phrases: Vec::new(),
                }));
            }
        }
        NodeKind::Delay(p) => {
            let mut secs = p.seconds;
            ui.add(egui::DragValue::new(&mut secs).range(1..=2_592_000).suffix(" s"));
            if secs != p.seconds {
                edits.push(PropertyEdit::SetDelaySeconds(secs));
            }
        }
        NodeKind::Transfer(p) => {
            let mut note = p.note.clone();
            ui.label("Note for the agent");
            if ui.text_edit_multiline(&mut note).changed() {
                edits.push(PropertyEdit::SetTransferNote(note));
            }
        }
        NodeKind::Tag(p) => {
            let mut tag = p.tag.clone();
            if ui.text_edit_singleline(&mut tag).changed() {
                edits.push(PropertyEdit::SetTagName(tag));
            }
            let mut action = p.action;
            ui.horizontal(|ui| {
                ui.radio_value(&mut action, TagAction::Add, "Add");
                ui.radio_value(&mut action, TagAction::Remove, "Remove");
            });
            if action != p.action {
                edits.push(PropertyEdit::SetTagAction(action));
            }
        }
        NodeKind::Status(p) => {
            let mut status = p.status.clone();
            ui.label("Target status");
            if ui.text_edit_singleline(&mut status).changed() {
                edits.push(PropertyEdit::SetTargetStatus(status));
            }
        }
        NodeKind::Webhook(p) => {
            let mut url = p.url.clone();
            ui.label("URL");
            if ui.text_edit_singleline(&mut url).changed() {
                edits.push(PropertyEdit::SetWebhookUrl(url));
            }
            let mut method = p.method;
            ui.horizontal(|ui| {
                for m in [HttpMethod::Get, HttpMethod::Post, HttpMethod::Put] {
                    ui.radio_value(&mut method, m, format!("{:?}", m).to_uppercase());
                }
            });
            if method != p.method {
                edits.push(PropertyEdit::SetWebhookMethod(method));
            }
        }
        NodeKind::End(_) => {
            ui.label("The flow finishes here.");
        }
    }
}

fn rule_editor(ui: &mut egui::Ui, index: usize, rule: &ConditionRule) -> Option<ConditionRule> {
    let mut edited = rule.clone();
    egui::ComboBox::from_id_salt(("rule_kind", index))
        .selected_text(rule.label())
        .show_ui(ui, |ui| {
            ui.selectable_value(&mut edited, ConditionRule::Replied, "Replied");
            ui.selectable_value(&mut edited, ConditionRule::NoReply, "No reply");
            ui.selectable_value(&mut edited, ConditionRule::Always, "Always");
            if !matches!(rule, ConditionRule::TextMatch { .. }) {
                ui.selectable_value(
                    &mut edited,
                    ConditionRule::TextMatch {
                        text: String::new(),
                        mode: MatchMode::Contains,
                    },
                    "Text match",
                );
            }
        });
    if let ConditionRule::TextMatch { text, mode } = &mut edited {
        egui::ComboBox::from_id_salt(("rule_mode", index))
            .selected_text(format!("{:?}", mode))
            .show_ui(ui, |ui| {
                for m in [MatchMode::Contains, MatchMode::Equals, MatchMode::StartsWith] {
                    ui.selectable_value(mode, m, format!("{:?}", m));
                }
            });
        ui.add(egui::TextEdit::singleline(text).desired_width(100.0));
    }
    (&edited != rule).then_some(edited)
}

// ────────────────────────────────────────────────────────────────────────────
// Canvas
// ────────────────────────────────────────────────────────────────────────────

fn to_point(p: Pos2, origin: Pos2) -> Point {
    Point::new(p.x - origin.x, p.y - origin.y)
}

fn to_pos(p: Point, origin: Pos2) -> Pos2 {
    Pos2::new(p.x + origin.x, p.y + origin.y)
}

fn to_egui_rect(r: Rect, origin: Pos2) -> EguiRect {
    EguiRect::from_min_max(to_pos(r.min, origin), to_pos(r.max, origin))
}

/// Header buttons of a node in canvas-local screen space, right to left.
fn header_buttons(node: &Node, app: &FlowEditorApp, layout: &NodeLayout) -> [(NodeAction, Rect); 3] {
    let r = layout.node_rect(node).to_screen(&app.session.viewport);
    let size = HEADER_BUTTON * app.session.viewport.scale;
    let header = layout.header_height * app.session.viewport.scale;
    let y = r.min.y + (header - size) * 0.5;
    let at = |k: f32| Rect::from_min_size(Point::new(r.max.x - (size + 4.0) * (k + 1.0) - 8.0, y), size, size);
    [
        (NodeAction::Delete, at(0.0)),
        (NodeAction::Duplicate, at(1.0)),
        (NodeAction::ToggleCollapse, at(2.0)),
    ]
}

fn node_color(t: NodeType) -> Color32 {
    match t {
        NodeType::Trigger => Color32::from_rgb(37, 211, 102),
        NodeType::Message => Color32::from_rgb(52, 120, 246),
        NodeType::Wait | NodeType::Delay => Color32::from_rgb(245, 166, 35),
        NodeType::Condition | NodeType::Intent => Color32::from_rgb(142, 68, 173),
        NodeType::Transfer => Color32::from_rgb(231, 76, 60),
        NodeType::Tag | NodeType::Status | NodeType::Webhook => Color32::from_rgb(22, 160, 133),
        NodeType::End => Color32::from_rgb(120, 120, 120),
    }
}

fn canvas(app: &mut FlowEditorApp, ui: &mut egui::Ui) {
    let rect = ui.available_rect_before_wrap();
    let response = ui.interact(rect, ui.id().with("flow_canvas"), Sense::click_and_drag());
    let origin = rect.min;
    let layout = app.session.config.layout();

    // Palette drops.
    if let Some(drag) = response.dnd_release_payload::<PaletteDrag>() {
        if let Some(pos) = ui.input(|i| i.pointer.interact_pos()) {
            let fb = app.session.dispatch(EditorEvent::PaletteDrop {
                drag: *drag,
                pos: to_point(pos, origin),
            });
            app.record(fb);
        }
    }

    handle_canvas_input(app, ui, &response, origin, &layout);

    let painter = ui.painter_at(rect);
    let session = &app.session;
    let vp = &session.viewport;
    let scale = vp.scale;

    // Edges.
    for c in &session.graph.connections {
        let Some(path) = layout.connection_path(&session.graph, vp, c) else {
            continue;
        };
        let selected = session.selection.connection == Some(c.id);
        let stroke = if selected {
            Stroke::new(3.0, Color32::from_rgb(52, 120, 246))
        } else {
            Stroke::new(2.0, Color32::from_gray(120))
        };
        let points: Vec<Pos2> = path.sample(32).into_iter().map(|p| to_pos(p, origin)).collect();
        painter.add(Shape::line(points, stroke));
    }

    // Live preview while drawing a connection.
    if let Some(path) = session
        .controller
        .preview_edge(&session.graph, vp, &session.config)
    {
        let color = match session.controller.hovered_target(&session.graph) {
            Some((_, true)) => Color32::from_rgb(37, 211, 102),
            Some((_, false)) => Color32::from_rgb(231, 76, 60),
            None => Color32::from_gray(150),
        };
        let points: Vec<Pos2> = path.sample(32).into_iter().map(|p| to_pos(p, origin)).collect();
        painter.add(Shape::dashed_line(&points, Stroke::new(2.0, color), 6.0, 4.0));
    }
    let drop_targets = session.controller.drop_targets(&session.graph);

    // Nodes.
    let title_font = FontId::proportional(13.0 * scale);
    let small_font = FontId::proportional(11.0 * scale);
    for node in &session.graph.nodes {
        let r = to_egui_rect(layout.node_rect(node).to_screen(vp), origin);
        let color = node_color(node.node_type());
        let selected = session.selection.is_node_selected(node.id);
        painter.rect_filled(r, 6.0 * scale, Color32::WHITE);
        let header = EguiRect::from_min_size(r.min, Vec2::new(r.width(), layout.header_height * scale));
        painter.rect_filled(header, 6.0 * scale, color);
        let border = if selected {
            Stroke::new(2.0, Color32::from_rgb(52, 120, 246))
        } else {
            Stroke::new(1.0, Color32::from_gray(200))
        };
        painter.rect_stroke(r, 6.0 * scale, border, egui::StrokeKind::Inside);
        painter.text(
            Pos2::new(r.min.x + 8.0 * scale, header.center().y),
            Align2::LEFT_CENTER,
            node.node_type().as_str(),
            title_font.clone(),
            Color32::WHITE,
        );

        for (action, b) in header_buttons(node, app, &layout) {
            let glyph = match action {
                NodeAction::Delete => "✕",
                NodeAction::Duplicate => "⧉",
                NodeAction::ToggleCollapse if node.collapsed => "▸",
                NodeAction::ToggleCollapse => "▾",
            };
            painter.text(
                to_egui_rect(b, origin).center(),
                Align2::CENTER_CENTER,
                glyph,
                small_font.clone(),
                Color32::WHITE,
            );
        }

        if node.kind.has_input() {
            let p = to_pos(vp.canvas_to_screen(layout.input_anchor(node)), origin);
            let fill = if drop_targets.contains(&node.id) {
                Color32::from_rgb(37, 211, 102)
            } else {
                Color32::from_gray(160)
            };
            painter.circle_filled(p, 5.0 * scale, fill);
        }
        let outputs = node.kind.output_count();
        for i in 0..outputs {
            let p = to_pos(vp.canvas_to_screen(layout.output_anchor(node, i)), origin);
            painter.circle_filled(p, 5.0 * scale, color);
            if !node.collapsed && outputs > 1 {
                if let Some(label) = node.kind.output_label(i) {
                    painter.text(
                        p - Vec2::new(10.0 * scale, 0.0),
                        Align2::RIGHT_CENTER,
                        label,
                        small_font.clone(),
                        Color32::from_gray(80),
                    );
                }
            }
        }
        if !node.collapsed && outputs <= 1 {
            if let Some(summary) = node_summary(node) {
                painter.text(
                    Pos2::new(r.min.x + 8.0 * scale, header.max.y + 12.0 * scale),
                    Align2::LEFT_CENTER,
                    summary,
                    small_font.clone(),
                    Color32::from_gray(60),
                );
            }
        }
    }

    // Rubber band.
    if let Some(band) = &session.selection.rect {
        let r = to_egui_rect(band.rect(), origin);
        painter.rect_filled(r, 0.0, Color32::from_rgba_unmultiplied(52, 120, 246, 30));
        painter.rect_stroke(
            r,
            0.0,
            Stroke::new(1.0, Color32::from_rgb(52, 120, 246)),
            egui::StrokeKind::Inside,
        );
    }

    // Zoom controls.
    let center = Point::new(rect.width() * 0.5, rect.height() * 0.5);
    let mut zoom_event = None;
    egui::Area::new("zoom_controls".into())
        .fixed_pos(Pos2::new(rect.left() + 8.0, rect.top() + 8.0))
        .show(ui.ctx(), |ui| {
            egui::Frame::menu(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    if ui.small_button("−").clicked() {
                        zoom_event = Some(EditorEvent::ZoomOut { center });
                    }
                    if ui.small_button("+").clicked() {
                        zoom_event = Some(EditorEvent::ZoomIn { center });
                    }
                    if ui.small_button("100%").clicked() {
                        zoom_event = Some(EditorEvent::ZoomReset { center });
                    }
                    if ui.small_button("Fit").clicked() {
                        zoom_event = Some(EditorEvent::FitToContent {
                            width: rect.width(),
                            height: rect.height(),
                        });
                    }
                });
            });
        });
    if let Some(event) = zoom_event {
        app.session.dispatch(event);
    }
}

fn node_summary(node: &Node) -> Option<String> {
    let text = match &node.kind {
        NodeKind::Trigger(p) if p.subtype == TriggerSubtype::Keyword => {
            format!("keywords: {}", p.keywords.join(", "))
        }
        NodeKind::Trigger(_) => "new contact".to_string(),
        NodeKind::Message(p) => p.text.lines().next().unwrap_or_default().to_string(),
        NodeKind::Wait(p) => match p.timeout_seconds {
            Some(s) => format!("reply or {} s", s),
            None => "until reply".to_string(),
        },
        NodeKind::Delay(p) => format!("{} s", p.seconds),
        NodeKind::Tag(p) => format!("{:?} {}", p.action, p.tag),
        NodeKind::Status(p) => p.status.clone(),
        NodeKind::Webhook(p) => p.url.clone(),
        NodeKind::Transfer(p) => p.note.clone(),
        _ => return None,
    };
    let short: String = text.chars().take(28).collect();
    Some(short)
}

fn handle_canvas_input(
    app: &mut FlowEditorApp,
    ui: &egui::Ui,
    response: &egui::Response,
    origin: Pos2,
    layout: &NodeLayout,
) {
    let (pos, primary_pressed, middle_pressed, released, moved, scroll, mods) = ui.input(|i| {
        (
            i.pointer.interact_pos(),
            i.pointer.primary_pressed(),
            i.pointer.button_pressed(egui::PointerButton::Middle),
            i.pointer.any_released(),
            i.pointer.delta() != Vec2::ZERO,
            i.raw_scroll_delta.y,
            i.modifiers,
        )
    });
    let modifiers = Modifiers {
        shift: mods.shift,
        command: mods.command,
    };

    if let Some(pos) = pos {
        let p = to_point(pos, origin);
        let inside = response.rect.contains(pos);
        let dragging_palette = egui::DragAndDrop::has_any_payload(ui.ctx());

        if (primary_pressed || middle_pressed) && inside && !dragging_palette {
            let button_hit = app.session.graph.nodes.iter().rev().find_map(|n| {
                header_buttons(n, app, layout)
                    .into_iter()
                    .find(|(_, r)| r.contains(p))
                    .map(|(action, _)| (n.id, action))
            });
            let event = match button_hit {
                Some((node, action)) if primary_pressed => EditorEvent::NodeAction { node, action },
                _ => EditorEvent::PointerDown {
                    pos: p,
                    button: if primary_pressed {
                        PointerButton::Primary
                    } else {
                        PointerButton::Middle
                    },
                    modifiers,
                },
            };
            let fb = app.session.dispatch(event);
            app.record(fb);
        } else if moved && !app.session.controller.is_idle() {
            let fb = app.session.dispatch(EditorEvent::PointerMove { pos: p });
            app.record(fb);
        }

        if released && !app.session.controller.is_idle() {
            let fb = app.session.dispatch(EditorEvent::PointerUp { pos: p });
            app.record(fb);
        }

        if scroll != 0.0 && inside {
            app.session.dispatch(EditorEvent::Wheel {
                pos: p,
                notches: scroll / 50.0,
            });
        }
    }

    // Keys only go to the canvas when no text field has focus.
    if ui.ctx().wants_keyboard_input() {
        return;
    }
    let keys = ui.input(|i| {
        [
            (i.key_pressed(egui::Key::Escape), Key::Escape),
            (i.key_pressed(egui::Key::Delete), Key::Delete),
            (i.key_pressed(egui::Key::Backspace), Key::Backspace),
            (i.key_pressed(egui::Key::D), Key::D),
            (i.key_pressed(egui::Key::Z), Key::Z),
            (i.key_pressed(egui::Key::Y), Key::Y),
        ]
    });
    for (pressed, key) in keys {
        if pressed {
            let fb = app.session.dispatch(EditorEvent::KeyPressed { key, modifiers });
            app.record(fb);
        }
    }
    if modifiers.command && ui.input(|i| i.key_pressed(egui::Key::S)) {
        app.request_save();
    }
}
