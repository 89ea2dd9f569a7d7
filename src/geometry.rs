//! Canvas geometry: points and rectangles, node layout (body rect and port
//! anchors), cubic-bezier edge paths and hit testing.
//!
//! Node layout is computed in canvas space and projected through a
//! [`Viewport`]; edge paths and hit tests work in screen space so that click
//! tolerances stay constant in pixels regardless of zoom.

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::model::{Connection, ConnectionId, Node, NodeId};
use crate::viewport::Viewport;

/// Smallest horizontal control-point offset of an edge curve, in pixels.
pub const MIN_CONTROL_OFFSET: f32 = 40.0;

/// Number of segments used when flattening an edge curve for hit testing.
const EDGE_SAMPLES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, o: Point) -> Point {
        Point::new(self.x + o.x, self.y + o.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, o: Point) -> Point {
        Point::new(self.x - o.x, self.y - o.y)
    }
}

impl std::ops::Mul<f32> for Point {
    type Output = Point;
    fn mul(self, s: f32) -> Point {
        Point::new(self.x * s, self.y * s)
    }
}

/// Axis-aligned rectangle given by its min and max corners.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn from_min_size(min: Point, width: f32, height: f32) -> Self {
        Self {
            min,
            max: Point::new(min.x + width, min.y + height),
        }
    }

    /// Rectangle spanned by two arbitrary corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Project a canvas-space rectangle to screen space.
    pub fn to_screen(&self, viewport: &Viewport) -> Rect {
        Rect {
            min: viewport.canvas_to_screen(self.min),
            max: viewport.canvas_to_screen(self.max),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node layout
// ────────────────────────────────────────────────────────────────────────────

/// Metrics used to lay out node bodies and their ports in canvas space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeLayout {
    pub node_width: f32,
    pub header_height: f32,
    pub port_spacing: f32,
    /// Pick radius around a port anchor, in screen pixels.
    pub port_hit_radius: f32,
    /// Pick distance around an edge curve, in screen pixels.
    pub edge_hit_tolerance: f32,
}

impl Default for NodeLayout {
    fn default() -> Self {
        Self {
            node_width: 220.0,
            header_height: 36.0,
            port_spacing: 24.0,
            port_hit_radius: 10.0,
            edge_hit_tolerance: 8.0,
        }
    }
}

impl NodeLayout {
    /// Body rectangle of a node in canvas space. Collapsed nodes show only the header.
    pub fn node_rect(&self, node: &Node) -> Rect {
        let height = if node.collapsed {
            self.header_height
        } else {
            let rows = node.kind.output_count().max(1) as f32;
            self.header_height + rows * self.port_spacing + 8.0
        };
        Rect::from_min_size(node.position(), self.node_width, height)
    }

    /// Canvas-space anchor of the node's input port (left edge, header middle).
    pub fn input_anchor(&self, node: &Node) -> Point {
        Point::new(node.x, node.y + self.header_height * 0.5)
    }

    /// Canvas-space anchor of an output port. Outputs of a collapsed node all
    /// attach to the header's right edge.
    pub fn output_anchor(&self, node: &Node, index: usize) -> Point {
        let right = node.x + self.node_width;
        if node.collapsed {
            Point::new(right, node.y + self.header_height * 0.5)
        } else {
            Point::new(
                right,
                node.y + self.header_height + self.port_spacing * (index as f32 + 0.5),
            )
        }
    }

    /// Screen-space edge path for a connection, if both endpoints exist.
    pub fn connection_path(
        &self,
        graph: &Graph,
        viewport: &Viewport,
        connection: &Connection,
    ) -> Option<EdgePath> {
        let source = graph.node(connection.source_node_id)?;
        let target = graph.node(connection.target_node_id)?;
        let from = viewport.canvas_to_screen(self.output_anchor(source, connection.output_index));
        let to = viewport.canvas_to_screen(self.input_anchor(target));
        Some(EdgePath::between(from, to))
    }

    /// Bounding box of all nodes in canvas space.
    pub fn content_bounds(&self, graph: &Graph) -> Option<Rect> {
        graph
            .nodes
            .iter()
            .map(|n| self.node_rect(n))
            .reduce(|a, b| a.union(&b))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Edge paths
// ────────────────────────────────────────────────────────────────────────────

/// A cubic bezier from an output anchor to an input anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePath {
    pub from: Point,
    pub ctrl1: Point,
    pub ctrl2: Point,
    pub to: Point,
}

impl EdgePath {
    /// Build the S-curve between two anchors. Control points leave the source
    /// to the right and enter the target from the left, offset by half the
    /// horizontal distance, so right-to-left edges loop around instead of
    /// collapsing into a straight line.
    pub fn between(from: Point, to: Point) -> Self {
        let offset = ((to.x - from.x).abs() * 0.5).max(MIN_CONTROL_OFFSET);
        Self {
            from,
            ctrl1: Point::new(from.x + offset, from.y),
            ctrl2: Point::new(to.x - offset, to.y),
            to,
        }
    }

    /// Point on the curve at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f32) -> Point {
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        Point::new(
            a * self.from.x + b * self.ctrl1.x + c * self.ctrl2.x + d * self.to.x,
            a * self.from.y + b * self.ctrl1.y + c * self.ctrl2.y + d * self.to.y,
        )
    }

    /// Flatten the curve into `segments + 1` points.
    pub fn sample(&self, segments: usize) -> Vec<Point> {
        let segments = segments.max(1);
        (0..=segments)
            .map(|i| self.point_at(i as f32 / segments as f32))
            .collect()
    }

    /// Approximate distance from `p` to the curve.
    pub fn distance_to(&self, p: Point) -> f32 {
        self.sample(EDGE_SAMPLES)
            .windows(2)
            .map(|w| distance_to_segment(p, w[0], w[1]))
            .fold(f32::MAX, f32::min)
    }

    /// Whether `p` lies within the widened, invisible stroke of the curve.
    pub fn hits(&self, p: Point, tolerance: f32) -> bool {
        self.distance_to(p) <= tolerance
    }

    /// SVG path data (`M … C …`) for renderers that draw paths directly.
    pub fn to_svg(&self) -> String {
        format!(
            "M {} {} C {} {}, {} {}, {} {}",
            self.from.x,
            self.from.y,
            self.ctrl1.x,
            self.ctrl1.y,
            self.ctrl2.x,
            self.ctrl2.y,
            self.to.x,
            self.to.y
        )
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let ab = b - a;
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 <= f32::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

// ────────────────────────────────────────────────────────────────────────────
// Hit testing
// ────────────────────────────────────────────────────────────────────────────

/// What lies under a screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    OutputPort { node: NodeId, index: usize },
    InputPort(NodeId),
    Node(NodeId),
    Connection(ConnectionId),
    Canvas,
}

/// Resolve the topmost element under `screen`. Ports win over node bodies,
/// node bodies over edges. Later nodes are drawn on top and tested first.
pub fn hit_test(graph: &Graph, viewport: &Viewport, layout: &NodeLayout, screen: Point) -> Hit {
    for node in graph.nodes.iter().rev() {
        if let Some(hit) = port_hit(node, viewport, layout, screen) {
            return hit;
        }
    }

    let canvas = viewport.screen_to_canvas(screen);
    if let Some(node) = graph
        .nodes
        .iter()
        .rev()
        .find(|n| layout.node_rect(n).contains(canvas))
    {
        return Hit::Node(node.id);
    }

    for connection in graph.connections.iter().rev() {
        if let Some(path) = layout.connection_path(graph, viewport, connection) {
            if path.hits(screen, layout.edge_hit_tolerance) {
                return Hit::Connection(connection.id);
            }
        }
    }

    Hit::Canvas
}

/// Port under `screen` on a single node, if any.
pub fn port_hit(node: &Node, viewport: &Viewport, layout: &NodeLayout, screen: Point) -> Option<Hit> {
    if node.kind.has_input() {
        let anchor = viewport.canvas_to_screen(layout.input_anchor(node));
        if anchor.distance(screen) <= layout.port_hit_radius {
            return Some(Hit::InputPort(node.id));
        }
    }
    let outputs = node.kind.output_count();
    // A collapsed node stacks its outputs on one anchor; only a lone output stays pickable.
    if node.collapsed && outputs > 1 {
        return None;
    }
    (0..outputs)
        .find(|&i| {
            viewport
                .canvas_to_screen(layout.output_anchor(node, i))
                .distance(screen)
                <= layout.port_hit_radius
        })
        .map(|index| Hit::OutputPort {
            node: node.id,
            index,
        })
}

/// Nodes whose screen rectangle overlaps `screen_rect`.
pub fn nodes_in_rect(
    graph: &Graph,
    viewport: &Viewport,
    layout: &NodeLayout,
    screen_rect: &Rect,
) -> Vec<NodeId> {
    graph
        .nodes
        .iter()
        .filter(|n| layout.node_rect(n).to_screen(viewport).overlaps(screen_rect))
        .map(|n| n.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_from_corners_normalizes() {
        let r = Rect::from_corners(Point::new(10.0, 5.0), Point::new(-2.0, 8.0));
        assert_eq!(r.min, Point::new(-2.0, 5.0));
        assert_eq!(r.max, Point::new(10.0, 8.0));
        assert!(r.contains(Point::new(0.0, 6.0)));
    }

    #[test]
    fn test_edge_path_endpoints() {
        let path = EdgePath::between(Point::new(0.0, 0.0), Point::new(200.0, 100.0));
        assert_eq!(path.point_at(0.0), path.from);
        let end = path.point_at(1.0);
        assert!((end.x - 200.0).abs() < 1e-3 && (end.y - 100.0).abs() < 1e-3);
        assert_eq!(path.ctrl1, Point::new(100.0, 0.0));
        assert_eq!(path.ctrl2, Point::new(100.0, 100.0));
    }

    #[test]
    fn test_edge_path_minimum_offset() {
        let path = EdgePath::between(Point::new(0.0, 0.0), Point::new(10.0, 50.0));
        assert_eq!(path.ctrl1.x, MIN_CONTROL_OFFSET);
        assert_eq!(path.ctrl2.x, 10.0 - MIN_CONTROL_OFFSET);
    }

    #[test]
    fn test_segment_distance() {
        let d = distance_to_segment(Point::new(5.0, 3.0), Point::ZERO, Point::new(10.0, 0.0));
        assert!((d - 3.0).abs() < 1e-5);
        let d = distance_to_segment(Point::new(-4.0, 3.0), Point::ZERO, Point::new(10.0, 0.0));
        assert!((d - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_svg_path() {
        let path = EdgePath::between(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        assert_eq!(path.to_svg(), "M 0 0 C 50 0, 50 0, 100 0");
    }
}
