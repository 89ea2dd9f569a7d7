//! Editing layer on top of the graph model.
//!
//! - **Session**: the store object owning one open flow and its editing state
//! - **Controller**: pointer/keyboard state machine (drag, connect, pan, box select)
//! - **Properties**: per-type form fields and edits that keep ports in sync with rows
//! - **Palette**: the node types an operator can drop on the canvas
//! - **History**: undo/redo of every graph edit
//! - **Selection**: selected nodes and connection

pub mod controller;
pub mod history;
pub mod palette;
pub mod properties;
pub mod selection;
pub mod session;

pub use controller::{
    ControllerState, EditorContext, EditorEvent, Feedback, InteractionController, Key, Modifiers,
    NodeAction, PointerButton,
};
pub use history::{GraphCommand, History};
pub use palette::{PaletteCategory, PaletteDrag, PaletteItem, palette, palette_by_category};
pub use properties::{PropertyEdit, VariableCatalog, apply_edit, form_schema};
pub use selection::{Selection, SelectionRect};
pub use session::{DraftDoc, EditorSession, SaveStatus};
