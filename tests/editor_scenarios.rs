use anyhow::Result;
use camino::Utf8PathBuf;
use leadflow::config::EditorConfig;
use leadflow::editor::palette::PaletteDrag;
use leadflow::editor::{EditorEvent, EditorSession, Feedback, Key, Modifiers, PointerButton, PropertyEdit, SaveStatus};
use leadflow::error::GraphError;
use leadflow::geometry::Point;
use leadflow::model::{IntentRoute, NodeId, NodeKind, NodeType};
use leadflow::persistence::{self, FsFlowStore, PersistenceAdapter};

fn drop_node(session: &mut EditorSession, node_type: NodeType, x: f32, y: f32) -> NodeId {
    match session.dispatch(EditorEvent::PaletteDrop {
        drag: PaletteDrag::new(node_type),
        pos: session.viewport.canvas_to_screen(Point::new(x, y)),
    }) {
        Feedback::NodeAdded(id) => id,
        other => panic!("expected a new node, got {:?}", other),
    }
}

/// Drag from an output port to a node's input port.
fn wire(session: &mut EditorSession, source: NodeId, output: usize, target: NodeId) -> Feedback {
    let layout = session.config.layout();
    let from = session
        .viewport
        .canvas_to_screen(layout.output_anchor(session.graph.node(source).unwrap(), output));
    let to = session
        .viewport
        .canvas_to_screen(layout.input_anchor(session.graph.node(target).unwrap()));
    session.dispatch(EditorEvent::PointerDown {
        pos: from,
        button: PointerButton::Primary,
        modifiers: Modifiers::NONE,
    });
    session.dispatch(EditorEvent::PointerMove { pos: to });
    session.dispatch(EditorEvent::PointerUp { pos: to })
}

fn route(name: &str, phrase: &str) -> IntentRoute {
    IntentRoute {
        name: name.to_string(),
        phrases: vec![phrase.to_string()],
    }
}

fn temp_store() -> Result<(tempfile::TempDir, PersistenceAdapter<FsFlowStore>)> {
    let dir = tempfile::tempdir()?;
    let root = Utf8PathBuf::from_path_buf(dir.path().join("flows"))
        .map_err(|p| anyhow::anyhow!("non-UTF8 temp dir {:?}", p))?;
    Ok((dir, PersistenceAdapter::new(FsFlowStore::open(root)?)))
}

#[test]
fn test_build_save_and_reload_intent_flow() -> Result<()> {
    let config = EditorConfig::default();
    let mut session = EditorSession::new("Boas-vindas", config.clone());

    let trigger = drop_node(&mut session, NodeType::Trigger, 0.0, 0.0);
    let message = drop_node(&mut session, NodeType::Message, 400.0, 0.0);
    let intent = drop_node(&mut session, NodeType::Intent, 800.0, 0.0);
    session.apply_edit(message, PropertyEdit::SetMessageText("Olá {{nome}}!".into()))?;
    session.apply_edit(intent, PropertyEdit::AddIntentRoute(route("Preço", "quanto custa")))?;
    session.apply_edit(intent, PropertyEdit::AddIntentRoute(route("Agendar", "horário")))?;
    assert_eq!(session.graph.node(intent).unwrap().kind.output_count(), 4);

    assert!(matches!(wire(&mut session, trigger, 0, message), Feedback::Connected(_)));
    assert!(matches!(wire(&mut session, message, 0, intent), Feedback::Connected(_)));
    let mut ends = Vec::new();
    for i in 0..3 {
        let end = drop_node(&mut session, NodeType::End, 1300.0, i as f32 * 200.0);
        assert!(matches!(wire(&mut session, intent, i, end), Feedback::Connected(_)));
        ends.push(end);
    }
    assert!(session.graph.validate().is_empty(), "{:?}", session.graph.validate());

    // An intent output cannot lead back into the trigger.
    let before = session.graph.clone();
    let refused = wire(&mut session, intent, 3, trigger);
    assert!(
        matches!(refused, Feedback::Cancelled | Feedback::ConnectionRefused(GraphError::NoInputPort(_))),
        "{:?}",
        refused
    );
    assert_eq!(session.graph, before);
    assert_eq!(session.graph.connect(intent, 3, trigger), Err(GraphError::NoInputPort(trigger)));

    let (_dir, mut store) = temp_store()?;
    assert_eq!(session.save_status(), SaveStatus::Unsaved);
    let job = session.request_save().expect("idle session starts a save");
    assert_eq!(session.save_status(), SaveStatus::Saving);
    let result = store.save(&job.flow);
    assert!(session.finish_save(&job, result).is_none());
    assert_eq!(session.save_status(), SaveStatus::Saved);

    let loaded = store.load(session.id())?;
    let reopened = EditorSession::open(loaded.clone(), config);
    assert_eq!(reopened.graph, session.graph);
    assert_eq!(reopened.name(), "Boas-vindas");
    assert!(!reopened.is_dirty());
    for (i, end) in ends.iter().enumerate() {
        assert_eq!(reopened.graph.successor(intent, i), Some(*end));
    }

    let resaved = store.save(&loaded)?;
    assert_eq!(
        persistence::canonical_json(&resaved)?,
        persistence::canonical_json(&loaded)?
    );
    Ok(())
}

#[test]
fn test_removing_connected_condition_row() -> Result<()> {
    let mut session = EditorSession::new("Follow-up", EditorConfig::default());
    let condition = drop_node(&mut session, NodeType::Condition, 0.0, 0.0);
    let replied = drop_node(&mut session, NodeType::Message, 400.0, 0.0);
    let silent = drop_node(&mut session, NodeType::Message, 400.0, 300.0);
    assert!(matches!(wire(&mut session, condition, 0, replied), Feedback::Connected(_)));
    assert!(matches!(wire(&mut session, condition, 1, silent), Feedback::Connected(_)));
    let snapshot = session.graph.clone();

    let outcome = session.apply_edit(condition, PropertyEdit::RemoveConditionRow(0))?;
    let removed = outcome.removed_connection.expect("row 0 was wired");
    assert_eq!(removed.target_node_id, replied);
    assert_eq!(session.graph.node(condition).unwrap().kind.output_count(), 1);
    assert_eq!(session.graph.successor(condition, 0), Some(silent));
    assert_eq!(session.graph.connections.len(), 1);
    assert!(session.graph.validation_errors().is_empty());

    assert_eq!(
        session.apply_edit(condition, PropertyEdit::RemoveConditionRow(5)),
        Err(GraphError::RowOutOfRange { node: condition, index: 5 })
    );

    assert!(session.undo());
    assert_eq!(session.graph, snapshot);
    assert!(session.redo());
    assert_eq!(session.graph.successor(condition, 0), Some(silent));
    Ok(())
}

#[test]
fn test_delete_duplicate_and_undo_through_session() {
    let mut session = EditorSession::new("Teclado", EditorConfig::default());
    let trigger = drop_node(&mut session, NodeType::Trigger, 0.0, 0.0);
    let wait = drop_node(&mut session, NodeType::Wait, 400.0, 0.0);
    assert!(matches!(wire(&mut session, trigger, 0, wait), Feedback::Connected(_)));

    // Click the wait node body to select it.
    let body = session.viewport.canvas_to_screen(Point::new(450.0, 50.0));
    session.dispatch(EditorEvent::PointerDown {
        pos: body,
        button: PointerButton::Primary,
        modifiers: Modifiers::NONE,
    });
    session.dispatch(EditorEvent::PointerUp { pos: body });
    assert_eq!(session.selected_node().map(|n| n.id), Some(wait));

    let fb = session.dispatch(EditorEvent::KeyPressed {
        key: Key::D,
        modifiers: Modifiers::COMMAND,
    });
    let Feedback::NodesDuplicated(pairs) = fb else {
        panic!("expected a duplicate, got {:?}", fb);
    };
    let copy = pairs[0].1;
    assert!(matches!(session.graph.node(copy).unwrap().kind, NodeKind::Wait(_)));
    assert!(session.graph.connection_into(copy).is_none());

    let revision = session.revision();
    let fb = session.dispatch(EditorEvent::KeyPressed {
        key: Key::Delete,
        modifiers: Modifiers::NONE,
    });
    assert!(matches!(fb, Feedback::NodesRemoved(_)));
    assert!(session.revision() > revision);

    session.dispatch(EditorEvent::KeyPressed {
        key: Key::Z,
        modifiers: Modifiers::COMMAND,
    });
    assert!(session.graph.node(copy).is_some());
}
