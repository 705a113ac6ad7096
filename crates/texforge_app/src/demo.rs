// SPDX-License-Identifier: MIT OR Apache-2.0
//! Demo graph written by `texforge demo`.

use anyhow::{Context, Result};
use texforge_graph::{Device, Engine, NodeId, PinId, PinValue};

fn output<D: Device>(engine: &Engine<D>, node: NodeId) -> Result<PinId> {
    engine
        .graph()
        .node(node)
        .and_then(|n| n.output(0))
        .map(|p| p.id)
        .context("node has no output")
}

fn input<D: Device>(engine: &Engine<D>, node: NodeId, name: &str) -> Result<PinId> {
    engine
        .graph()
        .node(node)
        .and_then(|n| n.inputs.iter().find(|p| p.name == name))
        .map(|p| p.id)
        .with_context(|| format!("node has no input named {name}"))
}

/// Build noise into brightness, driven by a small math chain, into a material
pub fn build<D: Device>(engine: &mut Engine<D>) -> Result<()> {
    let base = engine.add_node_at("float", [-600.0, 200.0])?;
    let scale = engine.add_node_at("math", [-400.0, 200.0])?;
    let noise = engine.add_node_at("perlin_noise", [-400.0, -100.0])?;
    let adjust = engine.add_node_at("brightness_contrast", [-150.0, 0.0])?;
    let cells = engine.add_node_at("voronoi", [-400.0, 400.0])?;
    let blur = engine.add_node_at("blur", [-150.0, 400.0])?;
    let material = engine.add_node_at("pbr_material", [150.0, 100.0])?;

    engine.set_input_value(input(engine, base, "Value")?, PinValue::Float(0.4))?;
    engine.set_input_value(input(engine, scale, "B")?, PinValue::Float(0.5))?;
    // Multiply
    engine.set_input_value(input(engine, scale, "Operation")?, PinValue::Enum(2))?;
    engine.set_input_value(input(engine, noise, "Seed")?, PinValue::Int(1337))?;

    engine.connect(output(engine, base)?, input(engine, scale, "A")?)?;
    engine.connect(output(engine, noise)?, input(engine, adjust, "Image")?)?;
    engine.connect(output(engine, scale)?, input(engine, adjust, "Brightness")?)?;
    engine.connect(output(engine, adjust)?, input(engine, material, "Base Color")?)?;
    engine.connect(output(engine, cells)?, input(engine, blur, "Image")?)?;
    engine.connect(output(engine, blur)?, input(engine, material, "Roughness")?)?;

    engine.set_displayed(Some(adjust))?;
    Ok(())
}
