//! Every shader module the demo scene loads has a GLSL source.

use std::path::Path;

const SHADER_SOURCES: [&str; 8] = [
    "depth.vert",
    "gbuffer.vert",
    "gbuffer.frag",
    "fullscreen.vert",
    "lighting.frag",
    "composite.frag",
    "skybox.vert",
    "skybox.frag",
];

#[test]
fn test_shader_sources_exist() {
    let shader_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders");
    for name in SHADER_SOURCES {
        let path = shader_dir.join(name);
        assert!(path.exists(), "missing shader source {:?}", path);
    }
}

#[test]
fn test_lighting_shader_binds_uniforms_before_samplers() {
    let source = std::fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders/lighting.frag"),
    )
    .expect("lighting.frag should be readable");

    // Two uniform blocks at bindings 0-1, four samplers at 2-5.
    for binding in 0..2 {
        assert!(source.contains(&format!("binding = {binding}) uniform ")));
    }
    for binding in 2..6 {
        assert!(source.contains(&format!("binding = {binding}) uniform sampler2D")));
    }
}
