//! End-to-end tests of the shadow pipeline on the recording backend.
//!
//! Every test starts the full demo (meshes, nine shader programs, shadow
//! targets, per-algorithm graphs) against `DummyBackend` and inspects the
//! passes it recorded.

mod common;

use rstest::rstest;

use common::{pass, pass_labels, start};
use shadow_lab::backend::dummy::RecordedCommand;
use shadow_lab::backend::GraphicsBackend;
use shadow_lab::resources::{load_mesh, GeometryCache, MeshLibrary, VertexChannel};
use shadow_lab::shader::{ShaderError, ShaderRegistry};
use shadow_lab::state::InputEvent;
use shadow_lab::{DemoError, ShadowAlgorithm, ShadowDemo};

const DEPTH: &str = "Shadow Depth";
const MOMENTS: &str = "Shadow Moments";
const SHADING: &str = "Shadow Shading";

fn model_bytes(demo: &ShadowDemo, program: shadow_lab::backend::ProgramHandle, block: &[u8]) -> Vec<u8> {
    let (offset, _) = demo
        .shaders()
        .program(program)
        .and_then(|p| p.uniform("model"))
        .unwrap();
    block[offset as usize..offset as usize + 64].to_vec()
}

#[test]
fn test_startup_loads_meshes_and_programs() {
    let (_backend, demo) = start(ShadowAlgorithm::Basic);

    // teapot, bunny, square, board and the blur quad
    assert_eq!(demo.meshes().len(), 5);
    assert!(demo.meshes().iter().all(|(_, mesh)| !mesh.is_empty()));
    assert_eq!(demo.shaders().len(), 9);
    assert_eq!(demo.scene().instances().len(), 4);
}

#[rstest]
#[case(ShadowAlgorithm::Basic, &[DEPTH, SHADING])]
#[case(ShadowAlgorithm::Biased, &[DEPTH, SHADING])]
#[case(ShadowAlgorithm::Pcf, &[DEPTH, SHADING])]
#[case(ShadowAlgorithm::Pcss, &[DEPTH, SHADING])]
#[case(ShadowAlgorithm::Vssm, &[MOMENTS, "Moment Blur Horizontal", "Moment Blur Vertical", SHADING])]
#[case(ShadowAlgorithm::Msm, &[DEPTH, SHADING])]
fn test_frame_pass_sequence(#[case] algorithm: ShadowAlgorithm, #[case] expected: &[&str]) {
    let (mut backend, mut demo) = start(algorithm);
    assert!(demo.frame(&mut backend).unwrap());

    assert_eq!(pass_labels(&backend), expected);

    let shading = pass(&backend, SHADING);
    assert_eq!(
        shading.programs(),
        vec![demo.pipeline().programs().shading(algorithm)]
    );
    assert_eq!(shading.draw_count(), 4);
}

#[test]
fn test_key_selects_pcf_on_next_frame() {
    let (mut backend, mut demo) = start(ShadowAlgorithm::Basic);
    demo.frame(&mut backend).unwrap();
    let basic = pass(&backend, SHADING).programs()[0];

    demo.queue_input(InputEvent::Key('3'));
    assert_eq!(demo.state().algorithm, ShadowAlgorithm::Basic);

    demo.frame(&mut backend).unwrap();
    assert_eq!(demo.state().algorithm, ShadowAlgorithm::Pcf);
    let pcf = pass(&backend, SHADING).programs()[0];
    assert_ne!(basic, pcf);

    let fragment = |handle| {
        demo.shaders()
            .program(handle)
            .and_then(|p| p.fragment_path())
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap()
    };
    assert_eq!(fragment(basic), "shadow_basic.frag.wgsl");
    assert_eq!(fragment(pcf), "shadow_pcf.frag.wgsl");
}

#[test]
fn test_switch_never_applies_to_a_recorded_frame() {
    let (mut backend, mut demo) = start(ShadowAlgorithm::Basic);
    demo.frame(&mut backend).unwrap();
    let before = backend.last_frame().to_vec();

    demo.queue_input(InputEvent::Key('5'));
    demo.queue_input(InputEvent::Key('x'));

    let unchanged: Vec<_> = backend.last_frame().iter().map(|p| p.label()).collect();
    assert_eq!(unchanged, vec![DEPTH, SHADING]);
    assert_eq!(backend.last_frame()[1].commands, before[1].commands);

    demo.frame(&mut backend).unwrap();
    assert_eq!(demo.state().algorithm, ShadowAlgorithm::Vssm);
    assert_eq!(backend.last_frame()[0].label(), MOMENTS);
}

#[rstest]
#[case(ShadowAlgorithm::Basic, DEPTH)]
#[case(ShadowAlgorithm::Vssm, MOMENTS)]
fn test_depth_and_shading_share_model_matrices(
    #[case] algorithm: ShadowAlgorithm,
    #[case] depth_label: &str,
) {
    let (mut backend, mut demo) = start(algorithm);
    demo.frame(&mut backend).unwrap();

    let programs = *demo.pipeline().programs();
    let depth = pass(&backend, depth_label).uniforms_per_draw();
    let shading = pass(&backend, SHADING).uniforms_per_draw();
    assert_eq!(depth.len(), 4);
    assert_eq!(shading.len(), 4);

    for (light, camera) in depth.iter().zip(&shading) {
        assert_eq!(
            model_bytes(&demo, programs.depth, light),
            model_bytes(&demo, programs.shading(algorithm), camera)
        );
    }
}

#[test]
fn test_vssm_shades_with_vertically_blurred_moments() {
    let (mut backend, mut demo) = start(ShadowAlgorithm::Vssm);
    demo.frame(&mut backend).unwrap();

    let (view, sampler) = demo.pipeline().shadow_targets().blur[1]
        .view()
        .sampled
        .unwrap();
    let bound = pass(&backend, SHADING)
        .commands
        .iter()
        .find_map(|c| match c {
            RecordedCommand::SetTexture { unit: 0, view, sampler } => Some((*view, *sampler)),
            _ => None,
        });
    assert_eq!(bound, Some((view, sampler)));
}

#[test]
fn test_shadow_targets_survive_resize() {
    let (mut backend, mut demo) = start(ShadowAlgorithm::Basic);
    demo.frame(&mut backend).unwrap();
    let created = backend.textures_created();

    demo.queue_input(InputEvent::Resized {
        width: 1024,
        height: 768,
    });
    demo.frame(&mut backend).unwrap();

    // only the window depth buffer is recreated
    assert_eq!(backend.textures_created(), created + 1);
    for target in demo.pipeline().shadow_targets().iter() {
        assert_eq!((target.width, target.height), (1024, 1024));
    }
    let shading = pass(&backend, SHADING);
    assert!(shading.commands.contains(&RecordedCommand::SetViewport {
        width: 1024.0,
        height: 768.0
    }));
    assert!(pass(&backend, DEPTH)
        .commands
        .contains(&RecordedCommand::SetViewport {
            width: 1024.0,
            height: 1024.0
        }));
}

#[test]
fn test_resizes_release_old_depth_views() {
    let (mut backend, mut demo) = start(ShadowAlgorithm::Basic);
    demo.frame(&mut backend).unwrap();
    let textures = backend.live_textures();
    let views = backend.live_views();

    for (width, height) in [(1024, 768), (640, 480), (1280, 720)] {
        demo.queue_input(InputEvent::Resized { width, height });
        demo.frame(&mut backend).unwrap();

        assert_eq!(backend.live_textures(), textures);
        assert_eq!(backend.live_views(), views);
    }
    assert_eq!(demo.pipeline().window_targets().width, 1280);
}

#[test]
fn test_mesh_without_uvs_leaves_uv_slot_alone() {
    let dir = common::scratch_dir("no_uvs");
    let path = common::write_position_only_triangle(&dir, "bare");

    let mut backend = shadow_lab::DummyBackend::new(64, 64);
    let mut shaders = ShaderRegistry::new();
    let assets = shadow_lab::AssetManifest::new(common::asset_root());
    let program = shaders
        .compile(
            &mut backend,
            &assets.shader("shadow.vert.wgsl"),
            &assets.shader("shadow_basic.frag.wgsl"),
        )
        .unwrap();
    let uv_slot = shaders
        .attribute_slot(program, VertexChannel::Texture.attribute_name())
        .unwrap();

    let mut library = MeshLibrary::new();
    let mesh = library.add(load_mesh(&path));
    assert!(library.get(mesh).unwrap().uvs.is_empty());

    let mut geometry = GeometryCache::new();
    backend.begin_frame().unwrap();
    backend.begin_render_pass(&shadow_lab::backend::RenderPassDescriptor {
        label: Some("bind".into()),
        color_attachments: vec![],
        depth_stencil_attachment: None,
    });
    let count = geometry
        .bind_mesh_for_program(&mut backend, &shaders, program, &library, mesh)
        .unwrap();
    backend.end_render_pass();
    backend.end_frame().unwrap();

    assert_eq!(count, 3);
    let commands = &backend.last_frame()[0].commands;
    assert!(commands.contains(&RecordedCommand::DisableVertexAttribute { slot: uv_slot }));
    assert!(!commands
        .iter()
        .any(|c| matches!(c, RecordedCommand::SetVertexBuffer { slot, .. } if *slot == uv_slot)));
}

#[test]
fn test_missing_mesh_is_empty() {
    let mesh = load_mesh(common::scratch_dir("missing_mesh").join("nowhere.gltf"));
    assert!(mesh.is_empty());
    assert_eq!(mesh.name, "nowhere");
}

#[test]
fn test_missing_scene_model_draws_nothing() {
    let root = common::copy_assets("missing_model");
    std::fs::remove_file(root.join("models").join("board.gltf")).unwrap();

    let mut backend = shadow_lab::DummyBackend::new(64, 64);
    let config = shadow_lab::DemoConfig {
        asset_root: root,
        ..common::config(ShadowAlgorithm::Basic)
    };
    let mut demo = ShadowDemo::new(&mut backend, &config).unwrap();

    let board = demo.scene_meshes().board;
    let mesh = demo.meshes().get(board).unwrap();
    assert!(mesh.is_empty());
    assert_eq!(mesh.name, "board");
    assert!(demo.scene().instances().iter().any(|i| i.mesh == board));

    assert!(demo.frame(&mut backend).unwrap());
    assert_eq!(pass(&backend, DEPTH).draw_count(), 3);
    assert_eq!(pass(&backend, SHADING).draw_count(), 3);
}

#[test]
fn test_missing_shader_is_fatal() {
    let root = common::copy_assets("missing_shader");
    std::fs::remove_file(root.join("shaders").join("shadow_pcf.frag.wgsl")).unwrap();

    let mut backend = shadow_lab::DummyBackend::new(64, 64);
    let config = shadow_lab::DemoConfig {
        asset_root: root,
        ..common::config(ShadowAlgorithm::Basic)
    };
    let result = ShadowDemo::new(&mut backend, &config);
    assert!(matches!(
        result,
        Err(DemoError::Shader(ShaderError::Read { .. }))
    ));
}

#[test]
fn test_broken_shader_is_fatal() {
    let root = common::copy_assets("broken_shader");
    std::fs::write(
        root.join("shaders").join("shadow_msm.frag.wgsl"),
        "@fragment fn fs_main( -> {",
    )
    .unwrap();

    let mut backend = shadow_lab::DummyBackend::new(64, 64);
    let config = shadow_lab::DemoConfig {
        asset_root: root,
        ..common::config(ShadowAlgorithm::Basic)
    };
    match ShadowDemo::new(&mut backend, &config) {
        Err(DemoError::Shader(ShaderError::Compile { label, .. })) => {
            assert!(label.contains("shadow_msm.frag.wgsl"));
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("broken shader compiled"),
    }
}
