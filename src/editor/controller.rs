//! Interaction controller: the pointer/keyboard state machine of the canvas.
//!
//! Front-ends translate raw input into [`EditorEvent`]s and hand them to
//! [`InteractionController::handle`] together with an [`EditorContext`]
//! borrowing the session's graph, viewport, selection and history. The
//! returned [`Feedback`] says what happened so the caller can repaint, mark
//! the flow dirty or show a refusal.
//!
//! ```text
//! Idle ──press node──▶ DraggingNode ──release──▶ Idle
//!  │  ──press output──▶ DrawingConnection ──release on input──▶ connect, Idle
//!  │  ──press canvas──▶ PanningCanvas ──release──▶ Idle
//!  └─ ──shift+press canvas──▶ BoxSelecting ──release──▶ select, Idle
//! Escape from any state ──▶ Idle, graph as before the gesture
//! ```

use tracing::debug;

use crate::config::EditorConfig;
use crate::error::GraphError;
use crate::geometry::{EdgePath, Hit, Point, hit_test, nodes_in_rect};
use crate::graph::Graph;
use crate::model::{ConnectionId, NodeId};
use crate::viewport::Viewport;

use super::history::{GraphCommand, History};
use super::palette::PaletteDrag;
use super::selection::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    /// Ctrl, or Cmd on macOS.
    pub command: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        command: false,
    };
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        command: false,
    };
    pub const COMMAND: Modifiers = Modifiers {
        shift: false,
        command: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Delete,
    Backspace,
    D,
    Y,
    Z,
}

/// Buttons on a node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    Delete,
    Duplicate,
    ToggleCollapse,
}

/// Input to the controller. Positions are screen coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    PointerDown {
        pos: Point,
        button: PointerButton,
        modifiers: Modifiers,
    },
    PointerMove {
        pos: Point,
    },
    PointerUp {
        pos: Point,
    },
    /// Scroll wheel; positive `notches` zoom in.
    Wheel {
        pos: Point,
        notches: f32,
    },
    KeyPressed {
        key: Key,
        modifiers: Modifiers,
    },
    PaletteDrop {
        drag: PaletteDrag,
        pos: Point,
    },
    NodeAction {
        node: NodeId,
        action: NodeAction,
    },
    ZoomIn {
        center: Point,
    },
    ZoomOut {
        center: Point,
    },
    ZoomReset {
        center: Point,
    },
    FitToContent {
        width: f32,
        height: f32,
    },
}

/// Controller state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    DraggingNode {
        /// The node under the pointer at press time.
        node: NodeId,
        /// Every node that moves with it and where it started.
        origins: Vec<(NodeId, Point)>,
        press: Point,
        moved: bool,
    },
    DrawingConnection {
        source: NodeId,
        output_index: usize,
        pointer: Point,
        /// Node whose input port is under the pointer.
        hover: Option<NodeId>,
    },
    PanningCanvas {
        last: Point,
    },
    BoxSelecting {
        additive: bool,
    },
}

impl ControllerState {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::DraggingNode { .. } => "dragging_node",
            ControllerState::DrawingConnection { .. } => "drawing_connection",
            ControllerState::PanningCanvas { .. } => "panning_canvas",
            ControllerState::BoxSelecting { .. } => "box_selecting",
        }
    }
}

/// What an event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// The event has no meaning in the current state.
    Ignored,
    /// A gesture started or progressed without touching the graph.
    Tracking,
    SelectionChanged,
    ViewportChanged,
    /// Nodes followed the pointer; the move is recorded on release.
    NodesDragged,
    NodesMoved(Vec<NodeId>),
    NodeAdded(NodeId),
    NodesRemoved(Vec<NodeId>),
    ConnectionRemoved(ConnectionId),
    /// `(original, copy)` pairs.
    NodesDuplicated(Vec<(NodeId, NodeId)>),
    CollapseToggled {
        node: NodeId,
        collapsed: bool,
    },
    Connected(ConnectionId),
    /// A connection drop was refused; the graph is unchanged.
    ConnectionRefused(GraphError),
    /// A node action could not be applied; the graph is unchanged.
    Failed(GraphError),
    /// The gesture was abandoned and its effects reverted.
    Cancelled,
    Undone,
    Redone,
}

impl Feedback {
    /// Whether the event committed a change to the flow document. A drag in
    /// progress only counts once it is released somewhere new.
    pub fn changes_graph(&self) -> bool {
        match self {
            Feedback::NodesMoved(ids) => !ids.is_empty(),
            other => other.commits_edit(),
        }
    }

    fn commits_edit(&self) -> bool {
        matches!(
            self,
            Feedback::NodeAdded(_)
                | Feedback::NodesRemoved(_)
                | Feedback::ConnectionRemoved(_)
                | Feedback::NodesDuplicated(_)
                | Feedback::CollapseToggled { .. }
                | Feedback::Connected(_)
                | Feedback::Undone
                | Feedback::Redone
        )
    }
}

/// The parts of a session the controller works on.
pub struct EditorContext<'a> {
    pub graph: &'a mut Graph,
    pub viewport: &'a mut Viewport,
    pub selection: &'a mut Selection,
    pub history: &'a mut History,
    pub config: &'a EditorConfig,
}

#[derive(Debug, Clone, Default)]
pub struct InteractionController {
    state: ControllerState,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ControllerState::Idle
    }

    fn set_state(&mut self, state: ControllerState) {
        if std::mem::discriminant(&self.state) != std::mem::discriminant(&state) {
            debug!(from = self.state.name(), to = state.name(), "controller transition");
        }
        self.state = state;
    }

    pub fn handle(&mut self, ctx: &mut EditorContext<'_>, event: EditorEvent) -> Feedback {
        match event {
            EditorEvent::PointerDown {
                pos,
                button,
                modifiers,
            } => self.pointer_down(ctx, pos, button, modifiers),
            EditorEvent::PointerMove { pos } => self.pointer_move(ctx, pos),
            EditorEvent::PointerUp { pos } => self.pointer_up(ctx, pos),
            EditorEvent::Wheel { pos, notches } => {
                if matches!(
                    self.state,
                    ControllerState::DraggingNode { .. } | ControllerState::PanningCanvas { .. }
                ) || notches == 0.0
                {
                    return Feedback::Ignored;
                }
                ctx.viewport.zoom_by(pos, ctx.config.zoom_step.powf(notches));
                Feedback::ViewportChanged
            }
            EditorEvent::KeyPressed { key, modifiers } => self.key_pressed(ctx, key, modifiers),
            EditorEvent::PaletteDrop { drag, pos } => {
                if !self.is_idle() {
                    return Feedback::Ignored;
                }
                let at = ctx.config.snap(ctx.viewport.screen_to_canvas(pos));
                let id = ctx.graph.add_node(drag.node_kind(), at);
                if let Some(cmd) = GraphCommand::added(ctx.graph, id) {
                    ctx.history.push(cmd);
                }
                ctx.selection.select_node(id);
                Feedback::NodeAdded(id)
            }
            EditorEvent::NodeAction { node, action } => {
                if !self.is_idle() {
                    return Feedback::Ignored;
                }
                node_action(ctx, node, action)
            }
            EditorEvent::ZoomIn { center } => {
                ctx.viewport.zoom_in(center, ctx.config.zoom_step);
                Feedback::ViewportChanged
            }
            EditorEvent::ZoomOut { center } => {
                ctx.viewport.zoom_out(center, ctx.config.zoom_step);
                Feedback::ViewportChanged
            }
            EditorEvent::ZoomReset { center } => {
                ctx.viewport.reset_zoom(center);
                Feedback::ViewportChanged
            }
            EditorEvent::FitToContent { width, height } => {
                match ctx.config.layout().content_bounds(ctx.graph) {
                    Some(bounds) => ctx.viewport.fit(&bounds, width, height, 40.0),
                    None => ctx.viewport.reset(),
                }
                Feedback::ViewportChanged
            }
        }
    }

    fn pointer_down(
        &mut self,
        ctx: &mut EditorContext<'_>,
        pos: Point,
        button: PointerButton,
        modifiers: Modifiers,
    ) -> Feedback {
        if !self.is_idle() {
            return Feedback::Ignored;
        }
        match button {
            PointerButton::Middle => {
                self.set_state(ControllerState::PanningCanvas { last: pos });
                return Feedback::Tracking;
            }
            PointerButton::Secondary => return Feedback::Ignored,
            PointerButton::Primary => {}
        }

        let layout = ctx.config.layout();
        match hit_test(ctx.graph, ctx.viewport, &layout, pos) {
            Hit::OutputPort { node, index } => {
                self.set_state(ControllerState::DrawingConnection {
                    source: node,
                    output_index: index,
                    pointer: pos,
                    hover: None,
                });
                Feedback::Tracking
            }
            Hit::InputPort(node) | Hit::Node(node) => {
                if modifiers.shift || modifiers.command {
                    ctx.selection.toggle_node(node);
                    if !ctx.selection.is_node_selected(node) {
                        return Feedback::SelectionChanged;
                    }
                } else if !ctx.selection.is_node_selected(node) {
                    ctx.selection.select_node(node);
                }
                let origins = ctx
                    .selection
                    .nodes
                    .iter()
                    .filter_map(|&id| ctx.graph.node(id).map(|n| (id, n.position())))
                    .collect();
                self.set_state(ControllerState::DraggingNode {
                    node,
                    origins,
                    press: pos,
                    moved: false,
                });
                Feedback::SelectionChanged
            }
            Hit::Connection(id) => {
                ctx.selection.select_connection(id);
                Feedback::SelectionChanged
            }
            Hit::Canvas => {
                if modifiers.shift {
                    ctx.selection.start_rect(pos);
                    self.set_state(ControllerState::BoxSelecting {
                        additive: modifiers.command,
                    });
                    Feedback::Tracking
                } else {
                    let had_selection = !ctx.selection.is_empty();
                    ctx.selection.clear();
                    self.set_state(ControllerState::PanningCanvas { last: pos });
                    if had_selection {
                        Feedback::SelectionChanged
                    } else {
                        Feedback::Tracking
                    }
                }
            }
        }
    }

    fn pointer_move(&mut self, ctx: &mut EditorContext<'_>, pos: Point) -> Feedback {
        match &mut self.state {
            ControllerState::Idle => Feedback::Ignored,
            ControllerState::DraggingNode {
                origins,
                press,
                moved,
                ..
            } => {
                if !*moved && press.distance(pos) < ctx.config.drag_threshold {
                    return Feedback::Tracking;
                }
                *moved = true;
                let delta = (pos - *press) * (1.0 / ctx.viewport.scale);
                for (id, origin) in origins.iter() {
                    let _ = ctx.graph.move_node(*id, ctx.config.snap(*origin + delta));
                }
                Feedback::NodesDragged
            }
            ControllerState::DrawingConnection { pointer, hover, .. } => {
                *pointer = pos;
                let layout = ctx.config.layout();
                *hover = match hit_test(ctx.graph, ctx.viewport, &layout, pos) {
                    Hit::InputPort(node) => Some(node),
                    _ => None,
                };
                Feedback::Tracking
            }
            ControllerState::PanningCanvas { last } => {
                let delta = pos - *last;
                *last = pos;
                ctx.viewport.pan_by(delta.x, delta.y);
                Feedback::ViewportChanged
            }
            ControllerState::BoxSelecting { .. } => {
                ctx.selection.update_rect(pos);
                Feedback::Tracking
            }
        }
    }

    fn pointer_up(&mut self, ctx: &mut EditorContext<'_>, pos: Point) -> Feedback {
        let state = std::mem::take(&mut self.state);
        if state != ControllerState::Idle {
            debug!(from = state.name(), to = "idle", "controller transition");
        }
        match state {
            ControllerState::Idle => Feedback::Ignored,
            ControllerState::DraggingNode { origins, moved, .. } => {
                if !moved {
                    return Feedback::SelectionChanged;
                }
                let mut moves = Vec::new();
                for (id, from) in origins {
                    if let Some(node) = ctx.graph.node(id) {
                        let to = node.position();
                        if to != from {
                            moves.push(GraphCommand::NodeMoved { id, from, to });
                        }
                    }
                }
                let ids: Vec<NodeId> = moves
                    .iter()
                    .filter_map(|c| match c {
                        GraphCommand::NodeMoved { id, .. } => Some(*id),
                        _ => None,
                    })
                    .collect();
                record(ctx.history, moves);
                Feedback::NodesMoved(ids)
            }
            ControllerState::DrawingConnection {
                source,
                output_index,
                ..
            } => {
                let layout = ctx.config.layout();
                let Hit::InputPort(target) = hit_test(ctx.graph, ctx.viewport, &layout, pos) else {
                    return Feedback::Cancelled;
                };
                match ctx.graph.connect(source, output_index, target) {
                    Ok(id) => {
                        let index = ctx.graph.connections.len() - 1;
                        ctx.history.push(GraphCommand::Connected {
                            index,
                            connection: ctx.graph.connections[index],
                        });
                        Feedback::Connected(id)
                    }
                    Err(e) => Feedback::ConnectionRefused(e),
                }
            }
            ControllerState::PanningCanvas { .. } => Feedback::Tracking,
            ControllerState::BoxSelecting { additive } => {
                let Some(rect) = ctx.selection.take_rect() else {
                    return Feedback::Tracking;
                };
                let layout = ctx.config.layout();
                let hits = nodes_in_rect(ctx.graph, ctx.viewport, &layout, &rect);
                if !additive {
                    ctx.selection.clear();
                }
                for id in hits {
                    if !ctx.selection.is_node_selected(id) {
                        ctx.selection.nodes.push(id);
                    }
                }
                Feedback::SelectionChanged
            }
        }
    }

    fn key_pressed(&mut self, ctx: &mut EditorContext<'_>, key: Key, modifiers: Modifiers) -> Feedback {
        if key == Key::Escape {
            return self.cancel(ctx);
        }
        if !self.is_idle() {
            return Feedback::Ignored;
        }
        match (key, modifiers.command) {
            (Key::Delete | Key::Backspace, _) => delete_selection(ctx),
            (Key::D, true) => {
                let ids = ctx.selection.nodes.clone();
                duplicate_nodes(ctx, &ids)
            }
            (Key::Z, true) if modifiers.shift => redo(ctx),
            (Key::Z, true) => {
                if ctx.history.undo(ctx.graph) {
                    forget_missing(ctx);
                    Feedback::Undone
                } else {
                    Feedback::Ignored
                }
            }
            (Key::Y, true) => redo(ctx),
            _ => Feedback::Ignored,
        }
    }

    /// Abandon the current gesture. Dragged nodes go back to where they
    /// started; nothing else has been applied yet. In `Idle` this clears the
    /// selection.
    pub fn cancel(&mut self, ctx: &mut EditorContext<'_>) -> Feedback {
        let state = std::mem::take(&mut self.state);
        debug!(from = state.name(), "gesture cancelled");
        match state {
            ControllerState::Idle => {
                if ctx.selection.is_empty() {
                    Feedback::Ignored
                } else {
                    ctx.selection.clear();
                    Feedback::SelectionChanged
                }
            }
            ControllerState::DraggingNode { origins, .. } => {
                for (id, origin) in origins {
                    let _ = ctx.graph.move_node(id, origin);
                }
                Feedback::Cancelled
            }
            ControllerState::BoxSelecting { .. } => {
                ctx.selection.rect = None;
                Feedback::Cancelled
            }
            ControllerState::DrawingConnection { .. } | ControllerState::PanningCanvas { .. } => {
                Feedback::Cancelled
            }
        }
    }

    /// Nodes whose input would accept the connection being drawn.
    pub fn drop_targets(&self, graph: &Graph) -> Vec<NodeId> {
        let ControllerState::DrawingConnection {
            source,
            output_index,
            ..
        } = self.state
        else {
            return Vec::new();
        };
        graph
            .nodes
            .iter()
            .filter(|n| graph.can_connect(source, output_index, n.id).is_ok())
            .map(|n| n.id)
            .collect()
    }

    /// The input port under the pointer while drawing, and whether it accepts the drop.
    pub fn hovered_target(&self, graph: &Graph) -> Option<(NodeId, bool)> {
        match self.state {
            ControllerState::DrawingConnection {
                source,
                output_index,
                hover: Some(target),
                ..
            } => Some((target, graph.can_connect(source, output_index, target).is_ok())),
            _ => None,
        }
    }

    /// Live edge from the source port to the pointer, snapped to the hovered input.
    pub fn preview_edge(&self, graph: &Graph, viewport: &Viewport, config: &EditorConfig) -> Option<EdgePath> {
        let ControllerState::DrawingConnection {
            source,
            output_index,
            pointer,
            hover,
        } = self.state
        else {
            return None;
        };
        let layout = config.layout();
        let from = viewport.canvas_to_screen(layout.output_anchor(graph.node(source)?, output_index));
        let to = hover
            .and_then(|t| graph.node(t))
            .map_or(pointer, |n| viewport.canvas_to_screen(layout.input_anchor(n)));
        Some(EdgePath::between(from, to))
    }
}

fn record(history: &mut History, mut cmds: Vec<GraphCommand>) {
    match cmds.len() {
        0 => {}
        1 => history.push(cmds.remove(0)),
        _ => history.push(GraphCommand::Batch(cmds)),
    }
}

fn redo(ctx: &mut EditorContext<'_>) -> Feedback {
    if ctx.history.redo(ctx.graph) {
        forget_missing(ctx);
        Feedback::Redone
    } else {
        Feedback::Ignored
    }
}

fn forget_missing(ctx: &mut EditorContext<'_>) {
    let graph = &*ctx.graph;
    ctx.selection.retain(
        |n| graph.node(n).is_some(),
        |c| graph.connection(c).is_some(),
    );
}

fn node_action(ctx: &mut EditorContext<'_>, node: NodeId, action: NodeAction) -> Feedback {
    match action {
        NodeAction::Delete => match ctx.graph.remove_node(node) {
            Ok(removed) => {
                ctx.history.push(GraphCommand::removed(removed));
                forget_missing(ctx);
                Feedback::NodesRemoved(vec![node])
            }
            Err(e) => Feedback::Failed(e),
        },
        NodeAction::Duplicate => duplicate_nodes(ctx, &[node]),
        NodeAction::ToggleCollapse => {
            let Some(current) = ctx.graph.node(node).map(|n| n.collapsed) else {
                return Feedback::Failed(GraphError::NodeNotFound(node));
            };
            match ctx.graph.set_collapsed(node, !current) {
                Ok(from) => {
                    ctx.history.push(GraphCommand::CollapsedSet {
                        id: node,
                        from,
                        to: !current,
                    });
                    Feedback::CollapseToggled {
                        node,
                        collapsed: !current,
                    }
                }
                Err(e) => Feedback::Failed(e),
            }
        }
    }
}

fn duplicate_nodes(ctx: &mut EditorContext<'_>, ids: &[NodeId]) -> Feedback {
    if ids.is_empty() {
        return Feedback::Ignored;
    }
    let offset = ctx.config.duplicate_offset();
    let mut pairs = Vec::new();
    let mut cmds = Vec::new();
    for &id in ids {
        match ctx.graph.duplicate_node(id, offset) {
            Ok(copy) => {
                if let Some(cmd) = GraphCommand::added(ctx.graph, copy) {
                    cmds.push(cmd);
                }
                pairs.push((id, copy));
            }
            Err(e) if pairs.is_empty() => return Feedback::Failed(e),
            Err(_) => {}
        }
    }
    record(ctx.history, cmds);
    ctx.selection.clear();
    ctx.selection.nodes = pairs.iter().map(|(_, copy)| *copy).collect();
    Feedback::NodesDuplicated(pairs)
}

fn delete_selection(ctx: &mut EditorContext<'_>) -> Feedback {
    if let Some(conn) = ctx.selection.connection {
        return match ctx.graph.disconnect(conn) {
            Ok((index, connection)) => {
                ctx.history.push(GraphCommand::Disconnected { index, connection });
                ctx.selection.clear();
                Feedback::ConnectionRemoved(conn)
            }
            Err(e) => {
                ctx.selection.clear();
                Feedback::Failed(e)
            }
        };
    }
    if ctx.selection.nodes.is_empty() {
        return Feedback::Ignored;
    }
    let mut removed_ids = Vec::new();
    let mut cmds = Vec::new();
    for id in ctx.selection.nodes.clone() {
        if let Ok(removed) = ctx.graph.remove_node(id) {
            cmds.push(GraphCommand::removed(removed));
            removed_ids.push(id);
        }
    }
    record(ctx.history, cmds);
    ctx.selection.clear();
    Feedback::NodesRemoved(removed_ids)
}
