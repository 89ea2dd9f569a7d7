//! Flow graph editor core for WhatsApp lead-engagement automations.
//!
//! A flow is a directed acyclic graph of typed nodes (trigger, message,
//! wait, condition, intent, delay, actions) joined by connections from an
//! output port to an input port. This crate holds the model, the graph
//! mutations and their invariants, the pan/zoom geometry, the interaction
//! state machine and the persistence adapter that loads and saves flows.
//!
//! The binary `leadflow` manages a directory of flow documents and, with the
//! `egui` feature, opens them in an interactive canvas.

pub mod config;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod model;
pub mod persistence;
pub mod viewport;

// Interactive canvas, behind the `egui` feature flag.
#[cfg(feature = "egui")]
pub mod ui;
