// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scenarios through the engine and the headless device.

use texforge_graph::device::ImageFormat;
use texforge_graph::session::{NodeRecord, Session};
use texforge_graph::{
    ConnectionError, Device, Engine, EngineError, EngineSettings, HeadlessDevice, NodeId, PinId,
    PinValue, SessionError, UpdateOutcome,
};

fn engine() -> Engine<HeadlessDevice> {
    Engine::new(HeadlessDevice::new(), EngineSettings::default()).unwrap()
}

fn input(engine: &Engine<HeadlessDevice>, node: NodeId, name: &str) -> PinId {
    engine
        .graph()
        .node(node)
        .unwrap()
        .inputs
        .iter()
        .find(|p| p.name == name)
        .unwrap()
        .id
}

fn output(engine: &Engine<HeadlessDevice>, node: NodeId) -> PinId {
    engine.graph().node(node).unwrap().outputs[0].id
}

/// float A -> math B -> brightness C
fn chain(engine: &mut Engine<HeadlessDevice>) -> (NodeId, NodeId, NodeId) {
    let a = engine.add_node("float").unwrap();
    let b = engine.add_node("math").unwrap();
    let c = engine.add_node("brightness_contrast").unwrap();

    engine.set_input_value(input(engine, a, "Value"), PinValue::Float(2.0)).unwrap();
    engine.set_input_value(input(engine, b, "B"), PinValue::Float(3.0)).unwrap();
    engine.connect(output(engine, a), input(engine, b, "A")).unwrap();
    engine.connect(output(engine, b), input(engine, c, "Brightness")).unwrap();
    (a, b, c)
}

#[test]
fn value_chain_feeds_image_node() {
    let mut engine = engine();
    let (a, b, c) = chain(&mut engine);

    let semaphore = engine.graph().node(c).unwrap().as_image().unwrap().resources.semaphore;
    let before = engine.device().counter_value(semaphore).unwrap();

    let report = match engine.update(a).unwrap() {
        UpdateOutcome::Submitted(report) => report,
        UpdateOutcome::Deferred => panic!("idle engine deferred an update"),
    };
    assert_eq!(report.order, vec![a, b, c]);
    assert_eq!(engine.pin_value(output(&engine, b)), Some(&PinValue::Float(5.0)));

    let (_, token) = report.tokens.iter().find(|(id, _)| *id == c).unwrap();
    assert_eq!(token.observed(), before);
    assert_eq!(token.wait_threshold(), before + 2);
    assert_eq!(engine.device().counter_value(semaphore).unwrap(), before + 2);

    // Image slot unbound, brightness 5 with no override, contrast 1
    let uniforms = engine.graph().node(c).unwrap().as_image().unwrap().resources.uniforms;
    assert_eq!(engine.device().uniforms(uniforms).unwrap(), vec![0.0, 5.0, 0.0, 1.0]);
    assert!(engine.display_handle(c).is_some());
}

#[test]
fn float_override_keeps_sentinel_and_restores_default() {
    let mut engine = engine();
    let value = engine.add_node("float").unwrap();
    let map = engine.add_node("gradient_map").unwrap();
    engine.set_input_value(input(&engine, value, "Value"), PinValue::Float(0.9)).unwrap();
    engine.update(value).unwrap();

    let target = input(&engine, map, "Input");
    let link = engine.connect(output(&engine, value), target).unwrap();
    assert_eq!(
        engine.pin_value(target),
        Some(&PinValue::FloatOrTexture {
            value: 0.9,
            texture: None
        })
    );

    engine.disconnect(link).unwrap();
    assert_eq!(
        engine.pin_value(target),
        Some(&PinValue::FloatOrTexture {
            value: 0.5,
            texture: None
        })
    );
    let descriptor = engine.graph().node(map).unwrap().as_image().unwrap().resources.descriptor;
    assert_eq!(engine.device().binding(descriptor, 0), None);
}

#[test]
fn texture_into_override_binds_slot() {
    let mut engine = engine();
    let noise = engine.add_node("perlin_noise").unwrap();
    let material = engine.add_node("pbr_material").unwrap();
    engine.connect(output(&engine, noise), input(&engine, material, "Metallic")).unwrap();

    let texture = engine.pin_value(output(&engine, noise)).unwrap().texture();
    assert!(texture.is_some());
    assert_eq!(
        engine.pin_value(input(&engine, material, "Metallic")),
        Some(&PinValue::FloatOrTexture {
            value: 0.0,
            texture
        })
    );

    // The producer's pass carries the transfer into the material.
    engine.update(noise).unwrap();
    let batch = engine.device().last_batch().unwrap();
    assert!(batch.iter().any(|s| s.node == material));
}

#[test]
fn connect_evicts_previous_producer() {
    let mut engine = engine();
    let first = engine.add_node("float").unwrap();
    let second = engine.add_node("float").unwrap();
    let math = engine.add_node("math").unwrap();
    let target = input(&engine, math, "A");

    engine.connect(output(&engine, first), target).unwrap();
    engine.connect(output(&engine, second), target).unwrap();

    assert_eq!(engine.graph().link_count(), 1);
    assert_eq!(engine.graph().pin(target).unwrap().connected, vec![output(&engine, second)]);
    assert!(engine.graph().pin(output(&engine, first)).unwrap().connected.is_empty());
}

#[test]
fn eviction_into_an_image_node_clears_the_binding_first() {
    let mut engine = engine();
    let noise = engine.add_node("perlin_noise").unwrap();
    let checker = engine.add_node("checker").unwrap();
    let blend = engine.add_node("blend").unwrap();
    let base = input(&engine, blend, "Base");

    let start = engine.device().stats().binding_updates;
    engine.connect(output(&engine, noise), base).unwrap();
    let first = engine.device().stats().binding_updates - start;
    engine.connect(output(&engine, checker), base).unwrap();
    let second = engine.device().stats().binding_updates - start - first;

    // Reset to the empty binding, then bind the new producer
    assert_eq!(first, 1);
    assert_eq!(second, 2);

    let descriptor = engine.graph().node(blend).unwrap().as_image().unwrap().resources.descriptor;
    let checker_output = engine.graph().node(checker).unwrap().as_image().unwrap().resources.output;
    assert_eq!(engine.device().binding(descriptor, 0), Some(checker_output));
    assert!(engine.graph().pin(output(&engine, noise)).unwrap().connected.is_empty());
    assert_eq!(engine.graph().link_count(), 1);
}

#[test]
fn cycles_and_bad_directions_are_rejected() {
    let mut engine = engine();
    let (a, b, _) = chain(&mut engine);
    let result = engine.connect(output(&engine, b), input(&engine, a, "Value"));
    assert!(matches!(
        result,
        Err(EngineError::Connection(ConnectionError::WouldCreateCycle(_)))
    ));
    let result = engine.connect(input(&engine, b, "B"), input(&engine, a, "Value"));
    assert!(matches!(
        result,
        Err(EngineError::Connection(ConnectionError::DirectionMismatch))
    ));
    assert_eq!(engine.graph().link_count(), 2);
}

#[test]
fn removal_renumbers_and_recomputes_consumers() {
    let mut engine = engine();
    let (a, b, c) = chain(&mut engine);
    engine.update(a).unwrap();

    assert_eq!(engine.remove_node(a).unwrap(), Some(0));
    assert_eq!(engine.graph().node_index(b), Some(0));
    assert_eq!(engine.graph().node_index(c), Some(1));
    assert_eq!(engine.graph().link_count(), 1);

    // B's A input is back to its literal zero, so B = 0 + 3
    assert_eq!(engine.pin_value(output(&engine, b)), Some(&PinValue::Float(3.0)));
}

#[test]
fn removing_a_value_producer_waits_before_rewriting_its_image_consumer() {
    let mut engine = Engine::new(
        HeadlessDevice::new().with_deferred_completion(),
        EngineSettings::default(),
    )
    .unwrap();
    let value = engine.add_node("float").unwrap();
    let adjust = engine.add_node("brightness_contrast").unwrap();
    engine.connect(output(&engine, value), input(&engine, adjust, "Brightness")).unwrap();
    engine.device_mut().complete_pending().unwrap();

    engine.set_input_value(input(&engine, value, "Value"), PinValue::Float(0.8)).unwrap();
    assert!(engine.device().has_in_flight());
    let completed = engine.device().history().len();

    engine.remove_node(value).unwrap();
    assert_eq!(engine.device().history().len(), completed + 1);
    assert!(!engine.has_pending());

    engine.device_mut().complete_pending().unwrap();
    let uniforms = engine.graph().node(adjust).unwrap().as_image().unwrap().resources.uniforms;
    assert_eq!(engine.device().uniforms(uniforms).unwrap()[1], 0.0);
}

#[test]
fn edits_on_a_stale_graph_apply_and_wait_for_rebuild() {
    let mut engine = engine();
    let noise = engine.add_node("perlin_noise").unwrap();
    let value = engine.add_node("float").unwrap();
    let math = engine.add_node("math").unwrap();

    engine.device_mut().fail_next_submit();
    assert!(engine.update(noise).is_err());
    assert!(engine.is_stale());

    let link = engine.connect(output(&engine, value), input(&engine, math, "A")).unwrap();
    assert_eq!(engine.graph().link_count(), 1);
    engine.set_input_value(input(&engine, value, "Value"), PinValue::Float(4.0)).unwrap();
    assert!(engine.is_stale());

    let report = engine.rebuild_all().unwrap();
    assert_eq!(report.order.len(), 3);
    assert_eq!(engine.pin_value(output(&engine, value)), Some(&PinValue::Float(4.0)));

    engine.disconnect(link).unwrap();
    assert_eq!(engine.graph().link_count(), 0);
}

#[test]
fn updates_defer_while_a_batch_is_in_flight() {
    let mut engine = Engine::new(
        HeadlessDevice::new().with_deferred_completion(),
        EngineSettings::default(),
    )
    .unwrap();
    let (a, b, c) = chain(&mut engine);
    let lone = engine.add_node("float").unwrap();
    assert!(engine.device().has_in_flight());

    let outcome = engine.set_input_value(input(&engine, a, "Value"), PinValue::Float(7.0));
    assert!(outcome.is_ok());
    assert!(engine.has_pending());
    assert_eq!(engine.poll().unwrap(), None);

    engine.device_mut().complete_pending().unwrap();
    let report = engine.poll().unwrap().unwrap();
    assert_eq!(report.order, vec![a, b, c]);
    assert!(!engine.has_pending());
    assert_eq!(engine.pin_value(output(&engine, b)), Some(&PinValue::Float(10.0)));

    // Two different roots collapse into a full rebuild.
    assert_eq!(engine.update(a).unwrap(), UpdateOutcome::Deferred);
    assert_eq!(engine.update(b).unwrap(), UpdateOutcome::Deferred);
    engine.device_mut().complete_pending().unwrap();
    let report = engine.poll().unwrap().unwrap();
    assert_eq!(report.order.len(), 4);
    assert!(report.order.contains(&lone));
}

#[test]
fn device_failure_makes_engine_stale_until_rebuild() {
    let mut engine = engine();
    let noise = engine.add_node("perlin_noise").unwrap();

    engine.device_mut().fail_next_submit();
    assert!(matches!(engine.update(noise), Err(EngineError::Device(_))));
    assert!(engine.is_stale());
    assert!(matches!(engine.update(noise), Err(EngineError::Stale(_))));
    // The replaced fence is destroyed
    assert_eq!(engine.device().live_fences(), 1);

    let report = engine.rebuild_all().unwrap();
    assert_eq!(report.order, vec![noise]);
    assert!(!engine.is_stale());
    assert!(matches!(engine.update(noise), Ok(UpdateOutcome::Submitted(_))));
}

#[test]
fn fence_timeout_is_a_device_error() {
    let mut engine = Engine::new(
        HeadlessDevice::new().with_deferred_completion(),
        EngineSettings {
            fence_timeout_ms: 1,
            ..Default::default()
        },
    )
    .unwrap();
    let noise = engine.add_node("perlin_noise").unwrap();
    engine.update(noise).unwrap();

    engine.device_mut().set_stalled(true);
    assert!(matches!(engine.rebuild_all(), Err(EngineError::Device(_))));
    assert!(engine.is_stale());

    engine.device_mut().set_stalled(false);
    engine.rebuild_all().unwrap();
    assert!(!engine.is_stale());
}

#[test]
fn session_round_trip_reproduces_graph() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.tfs");

    let mut engine = engine();
    let (_, _, c) = chain(&mut engine);
    let noise = engine.add_node_at("perlin_noise", [10.0, -20.0]).unwrap();
    engine.connect(output(&engine, noise), input(&engine, c, "Image")).unwrap();
    engine.view_mut().pan_by(egui::Vec2::new(30.0, 0.0));
    engine.save_session(&path).unwrap();

    let mut loaded = self::engine();
    let report = loaded.load_session(&path).unwrap();
    assert_eq!(report.order.len(), 4);
    assert_eq!(
        Session::capture(loaded.graph(), loaded.view()),
        Session::capture(engine.graph(), engine.view())
    );

    // Loaded values are recomputed by the rebuild.
    let b = loaded.graph().node_at(1).unwrap().id;
    assert_eq!(loaded.pin_value(output(&loaded, b)), Some(&PinValue::Float(5.0)));
}

#[test]
fn rejected_session_leaves_graph_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine();
    let (a, b, c) = chain(&mut engine);
    let textures = engine.device().live_textures();

    let mut session = Session::capture(engine.graph(), engine.view());
    session.nodes.push(NodeRecord {
        type_tag: 4096,
        inputs: Vec::new(),
        position: [0.0, 0.0],
    });
    let bad = dir.path().join("bad.tfs");
    session.save(&bad).unwrap();

    assert!(matches!(
        engine.load_session(&bad),
        Err(EngineError::Session(SessionError::UnknownNodeType { .. }))
    ));
    let garbage = dir.path().join("garbage.tfs");
    std::fs::write(&garbage, "not a session").unwrap();
    assert!(matches!(
        engine.load_session(&garbage),
        Err(EngineError::Session(SessionError::Parse(_)))
    ));

    let ids: Vec<NodeId> = engine.graph().node_ids().collect();
    assert_eq!(ids, vec![a, b, c]);
    assert_eq!(engine.graph().link_count(), 2);
    assert_eq!(engine.device().live_textures(), textures);
    assert!(!engine.is_stale());
}

#[test]
fn auto_format_cascades_downstream() {
    let mut engine = engine();
    let noise = engine.add_node("perlin_noise").unwrap();
    let first = engine.add_node("blur").unwrap();
    let second = engine.add_node("blur").unwrap();
    let material = engine.add_node("pbr_material").unwrap();
    engine.connect(output(&engine, first), input(&engine, second, "Image")).unwrap();
    engine.connect(output(&engine, second), input(&engine, material, "Normal")).unwrap();

    let format = |engine: &Engine<HeadlessDevice>, id: NodeId| {
        engine.graph().node(id).unwrap().as_image().unwrap().format()
    };
    assert_eq!(format(&engine, second), ImageFormat::Rgba8Unorm);

    engine.connect(output(&engine, noise), input(&engine, first, "Image")).unwrap();
    assert_eq!(format(&engine, first), ImageFormat::R16Float);
    assert_eq!(format(&engine, second), ImageFormat::R16Float);
    assert_eq!(engine.device().stats().recreated_outputs, 2);

    // Consumers sample the recreated outputs.
    let second_image = engine.graph().node(second).unwrap().as_image().unwrap();
    let first_output = engine.pin_value(output(&engine, first)).unwrap().texture();
    assert_eq!(engine.device().binding(second_image.resources.descriptor, 0), first_output);
    let material_descriptor = match &engine.graph().node(material).unwrap().payload {
        texforge_graph::node::NodePayload::Shader(shader) => shader.resources.descriptor,
        _ => unreachable!(),
    };
    let second_output = engine.pin_value(output(&engine, second)).unwrap().texture();
    assert_eq!(engine.device().binding(material_descriptor, 3), second_output);
}
