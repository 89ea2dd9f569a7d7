use anyhow::Result;
use camino::Utf8PathBuf;
use leadflow::config::EditorConfig;
use leadflow::editor::{EditorSession, PropertyEdit, SaveStatus};
use leadflow::error::PersistenceError;
use leadflow::geometry::Point;
use leadflow::model::{Flow, FlowStatus, NodeId, NodeKind, NodeType};
use leadflow::persistence::{FsFlowStore, MemoryBackend, PersistenceAdapter};

fn fs_adapter() -> Result<(tempfile::TempDir, PersistenceAdapter<FsFlowStore>)> {
    let dir = tempfile::tempdir()?;
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|p| anyhow::anyhow!("non-UTF8 temp dir {:?}", p))?;
    Ok((dir, PersistenceAdapter::new(FsFlowStore::open(root)?)))
}

fn small_flow(name: &str) -> Flow {
    let mut flow = Flow::new(name);
    let g = &mut flow.graph;
    let t = g.add_node(NodeKind::default_for(NodeType::Trigger, None), Point::ZERO);
    let m = g.add_node(
        NodeKind::default_for(NodeType::Message, None),
        Point::new(300.0, 0.0),
    );
    let e = g.add_node(
        NodeKind::default_for(NodeType::End, None),
        Point::new(600.0, 0.0),
    );
    g.connect(t, 0, m).unwrap();
    g.connect(m, 0, e).unwrap();
    flow
}

#[test]
fn test_document_on_disk_uses_wire_names() -> Result<()> {
    let (_dir, mut adapter) = fs_adapter()?;
    let flow = adapter.save(&small_flow("Wire"))?;
    let path = adapter.backend().path_of(&flow.id)?;
    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(doc["name"], "Wire");
    assert_eq!(doc["status"], "draft");
    assert_eq!(doc["nodes"][0]["type"], "trigger");
    assert_eq!(doc["nodes"][0]["payload"]["subtype"], "new_contact");
    assert_eq!(doc["connections"][0]["sourceNodeId"], 1);
    assert_eq!(doc["connections"][0]["outputIndex"], 0);
    assert_eq!(doc["connections"][1]["targetNodeId"], 3);
    assert!(doc["updatedAt"].is_string());
    assert!(!path.with_extension("json.tmp").exists());
    Ok(())
}

#[test]
fn test_duplicate_renumbers_and_keeps_topology() -> Result<()> {
    let (_dir, mut adapter) = fs_adapter()?;
    let mut original = small_flow("Reengajamento");
    // Sparse ids, as left behind by deletions in a long editing session.
    for (n, id) in original.graph.nodes.iter_mut().zip([10u64, 20, 30]) {
        n.id = NodeId(id);
    }
    for c in original.graph.connections.iter_mut() {
        c.source_node_id = NodeId(c.source_node_id.0 * 10);
        c.target_node_id = NodeId(c.target_node_id.0 * 10);
    }
    original.status = FlowStatus::Active;
    let original = adapter.save(&original)?;

    let copy = adapter.duplicate(&original.id)?;
    assert_ne!(copy.id, original.id);
    assert_eq!(copy.name, "Reengajamento (copy)");
    assert_eq!(copy.status, FlowStatus::Draft);
    assert_eq!(copy.graph.nodes.len(), 3);
    assert_eq!(copy.graph.connections.len(), 2);
    for (i, (a, b)) in original.graph.nodes.iter().zip(&copy.graph.nodes).enumerate() {
        assert_eq!(b.id.0, i as u64 + 1);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.position(), b.position());
    }
    assert_eq!(copy.graph.successor(NodeId(1), 0), Some(NodeId(2)));
    assert_eq!(copy.graph.successor(NodeId(2), 0), Some(NodeId(3)));
    assert_eq!(adapter.list()?.len(), 2);
    // The original is untouched.
    assert_eq!(adapter.load(&original.id)?, original);
    Ok(())
}

#[test]
fn test_activate_deactivate_and_delete() -> Result<()> {
    let (_dir, mut adapter) = fs_adapter()?;
    let flow = adapter.save(&small_flow("Status"))?;
    assert_eq!(adapter.set_active(&flow.id, true)?.status, FlowStatus::Active);
    assert_eq!(adapter.load(&flow.id)?.status, FlowStatus::Active);
    assert_eq!(adapter.set_active(&flow.id, false)?.status, FlowStatus::Inactive);
    adapter.delete(&flow.id)?;
    assert!(matches!(adapter.load(&flow.id), Err(PersistenceError::NotFound(_))));
    assert!(adapter.list()?.is_empty());
    Ok(())
}

#[test]
fn test_invalid_flow_is_never_written() -> Result<()> {
    let (_dir, mut adapter) = fs_adapter()?;
    let mut flow = small_flow("Broken");
    // Hand-edit a cycle the editor would have refused.
    let mut back = flow.graph.connections[0];
    back.id = flow.graph.next_connection_id();
    back.source_node_id = flow.graph.nodes[2].id;
    back.target_node_id = flow.graph.nodes[1].id;
    flow.graph.connections.push(back);
    flow.graph.nodes[2].kind = NodeKind::default_for(NodeType::Delay, None);

    let err = adapter.save(&flow).unwrap_err();
    assert!(matches!(err, PersistenceError::ValidationFailed(_)));
    assert!(!err.is_retryable());
    assert!(adapter.list()?.is_empty());
    Ok(())
}

#[test]
fn test_session_retries_after_backend_outage() -> Result<()> {
    let mut adapter = PersistenceAdapter::new(MemoryBackend::new());
    let mut session = EditorSession::open(small_flow("Retry"), EditorConfig::default());
    let message = session.graph.nodes[1].id;
    session.apply_edit(message, PropertyEdit::SetMessageText("Oi {{nome}}".into()))?;
    assert!(session.is_dirty());

    adapter.backend_mut().offline = true;
    let job = session.request_save().unwrap();
    // Edits made while the save runs are queued behind it.
    session.apply_edit(message, PropertyEdit::SetMessageText("Oi {{nome}}, tudo bem?".into()))?;
    assert!(session.request_save().is_none());

    let result = adapter.save(&job.flow);
    assert!(result.as_ref().unwrap_err().is_retryable());
    let follow_up = session
        .finish_save(&job, result)
        .expect("queued save starts after the failed one");
    assert!(session.is_dirty());

    adapter.backend_mut().offline = false;
    let result = adapter.save(&follow_up.flow);
    assert!(session.finish_save(&follow_up, result).is_none());
    assert_eq!(session.save_status(), SaveStatus::Saved);

    let stored = adapter.load(session.id())?;
    match &stored.graph.node(message).unwrap().kind {
        NodeKind::Message(p) => assert_eq!(p.text, "Oi {{nome}}, tudo bem?"),
        other => panic!("unexpected payload {:?}", other),
    }
    Ok(())
}
