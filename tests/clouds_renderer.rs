use cgmath::{Quaternion, Rad, Rotation3, Vector3};
use std::sync::Arc;
use volumetric_clouds::*;

const SCREEN: (u32, u32) = (1920, 1080);
const SCRATCH: RenderTarget = RenderTarget::Temporary(TemporaryId("clouds_color_tmp"));

struct Library {
    kernel: Option<KernelId>,
}

impl ShaderLibrary for Library {
    fn find(&self, name: &str) -> Option<KernelId> {
        if name == CloudsRenderer::KERNEL_NAME {
            self.kernel
        } else {
            None
        }
    }
}

static READY: Library = Library {
    kernel: Some(KernelId(7)),
};
static MISSING: Library = Library { kernel: None };

fn noise_pool(count: u32) -> Arc<BlueNoisePool> {
    let textures = (0..count)
        .map(|i| TextureHandle::new_2d(TextureId(100 + i), 64, 64))
        .collect();
    Arc::new(BlueNoisePool::new(textures).unwrap())
}

fn renderer() -> CloudsRenderer {
    CloudsRenderer::new(CloudSettings::default(), noise_pool(3))
}

struct Frame<'a> {
    library: &'a Library,
    pose: CameraPose,
    screen: (u32, u32),
    depth_available: bool,
    scene_view: bool,
}

impl Default for Frame<'_> {
    fn default() -> Self {
        Self {
            library: &READY,
            pose: CameraPose::identity(),
            screen: SCREEN,
            depth_available: true,
            scene_view: false,
        }
    }
}

fn render(renderer: &mut CloudsRenderer, frame: Frame<'_>) -> Vec<Command> {
    let mut commands = CommandBuffer::new();
    let mut ctx = FrameContext {
        screen_width: frame.screen.0,
        screen_height: frame.screen.1,
        camera: frame.pose,
        depth_available: frame.depth_available,
        scene_view: frame.scene_view,
        shaders: frame.library,
        commands: &mut commands,
    };
    renderer.render_frame(&mut ctx);
    commands.drain().collect()
}

fn render_still(renderer: &mut CloudsRenderer) -> Vec<Command> {
    render(renderer, Frame::default())
}

fn sheet(commands: &[Command]) -> &PropertySheet {
    match &commands[0] {
        Command::SetProperties { sheet, .. } => sheet,
        other => panic!("expected SetProperties first, got {:?}", other),
    }
}

fn plain_copy() -> Vec<Command> {
    vec![Command::Blit {
        source: RenderTarget::Source,
        destination: RenderTarget::Destination,
        program: None,
    }]
}

fn moved() -> CameraPose {
    CameraPose::new(Vector3::new(0.0, 0.0, 1.0), Quaternion::from_angle_y(Rad(0.0)))
}

#[test]
fn first_frame_records_full_pass_sequence() {
    let mut renderer = renderer();
    let commands = render_still(&mut renderer);

    let history = match renderer.temporal().history() {
        Some(history) => history,
        None => panic!("history should exist after a frame"),
    };
    assert_eq!(history.size, (480, 270));
    let history_target = RenderTarget::Persistent(history.id);
    let working = TargetDesc::new(480, 270, FilterMode::Bilinear);
    let kernel = KernelId(7);

    assert!(matches!(commands[0], Command::SetProperties { kernel: KernelId(7), .. }));
    assert_eq!(
        commands[1..],
        [
            Command::AllocatePersistent {
                id: history.id,
                desc: working,
            },
            Command::ClearTarget {
                target: history_target,
            },
            Command::GetTemporary {
                id: TemporaryId("clouds_color_tmp"),
                desc: working,
            },
            Command::Blit {
                source: history_target,
                destination: SCRATCH,
                program: Some(SubProgram {
                    kernel,
                    pass: KernelPass::Downsample,
                }),
            },
            Command::Blit {
                source: SCRATCH,
                destination: history_target,
                program: None,
            },
            Command::SetGlobalTexture {
                name: CLOUDS_COLOR_GLOBAL,
                target: history_target,
            },
            Command::Blit {
                source: RenderTarget::Source,
                destination: RenderTarget::Destination,
                program: Some(SubProgram {
                    kernel,
                    pass: KernelPass::Composite,
                }),
            },
            Command::ReleaseTemporary {
                id: TemporaryId("clouds_color_tmp"),
            },
        ]
    );
}

#[test]
fn steady_frames_reuse_history_without_clearing() {
    let mut renderer = renderer();
    render_still(&mut renderer);
    let commands = render_still(&mut renderer);

    assert_eq!(commands.len(), 7);
    assert_eq!(
        commands
            .iter()
            .filter(|c| matches!(c, Command::SetProperties { .. }))
            .count(),
        1
    );
    assert!(!commands.iter().any(|c| matches!(
        c,
        Command::AllocatePersistent { .. } | Command::ClearTarget { .. }
    )));
}

#[test]
fn missing_kernel_falls_back_to_copy() {
    let mut renderer = renderer();
    for _ in 0..3 {
        let commands = render(
            &mut renderer,
            Frame {
                library: &MISSING,
                ..Frame::default()
            },
        );
        assert_eq!(commands, plain_copy());
    }
    assert!(renderer.temporal().history().is_none());
    assert_eq!(renderer.temporal().noise_cursor(), 0);

    // Recovers as soon as the kernel shows up
    let commands = render_still(&mut renderer);
    assert_eq!(commands.len(), 9);
}

#[test]
fn missing_depth_falls_back_to_copy() {
    let mut renderer = renderer();
    let commands = render(
        &mut renderer,
        Frame {
            depth_available: false,
            ..Frame::default()
        },
    );
    assert_eq!(commands, plain_copy());
    assert_eq!(renderer.temporal().sample_index(), 0);
}

#[test]
fn disabled_and_scene_view_pass_through() {
    let mut renderer = renderer();
    let commands = render(
        &mut renderer,
        Frame {
            scene_view: true,
            ..Frame::default()
        },
    );
    assert_eq!(commands, plain_copy());

    renderer.settings_mut().set_enabled(false);
    assert!(!renderer.is_enabled());
    assert_eq!(render_still(&mut renderer), plain_copy());
    assert!(renderer.temporal().history().is_none());
}

#[test]
fn still_camera_accumulates_then_motion_resets() {
    let mut renderer = renderer();

    let first = render_still(&mut renderer);
    assert_eq!(sheet(&first).int(Uniform::SampleIndex), Some(1));

    let second = render(
        &mut renderer,
        Frame {
            pose: moved(),
            ..Frame::default()
        },
    );
    assert_eq!(sheet(&second).int(Uniform::SampleIndex), Some(0));
}

#[test]
fn sample_index_saturates_at_history_limit() {
    let mut renderer = renderer();
    let indices: Vec<_> = (0..7)
        .map(|_| {
            let commands = render_still(&mut renderer);
            sheet(&commands).int(Uniform::SampleIndex)
        })
        .collect();
    assert_eq!(
        indices,
        vec![Some(1), Some(2), Some(3), Some(4), Some(4), Some(4), Some(4)]
    );
    assert_eq!(HISTORY_LIMIT, 4);
}

#[test]
fn blue_noise_rotates_every_frame_regardless_of_motion() {
    let mut renderer = renderer();
    let poses = [
        CameraPose::identity(),
        moved(),
        CameraPose::identity(),
        moved(),
    ];

    let ids: Vec<_> = poses
        .iter()
        .map(|&pose| {
            let commands = render(
                &mut renderer,
                Frame {
                    pose,
                    ..Frame::default()
                },
            );
            sheet(&commands)
                .texture(Uniform::BlueNoiseTex)
                .map(|texture| texture.id)
        })
        .collect();

    assert_eq!(
        ids,
        vec![
            Some(TextureId(100)),
            Some(TextureId(101)),
            Some(TextureId(102)),
            Some(TextureId(100)),
        ]
    );
    assert_eq!(renderer.temporal().noise_cursor(), 1);
}

#[test]
fn blue_noise_coords_scale_working_size_by_tile_size() {
    let mut renderer = renderer();
    let commands = render_still(&mut renderer);
    assert_eq!(
        sheet(&commands).vector(Uniform::BlueNoiseCoords),
        Some([7.5, 4.21875, 0.0, 0.0])
    );

    renderer.settings_mut().set_blue_noise_scale(2.0);
    let commands = render_still(&mut renderer);
    assert_eq!(
        sheet(&commands).vector(Uniform::BlueNoiseCoords),
        Some([15.0, 8.4375, 0.0, 0.0])
    );
}

#[test]
fn absent_noise_textures_are_not_bound() {
    let mut renderer = renderer();
    let commands = render_still(&mut renderer);
    let sheet = sheet(&commands);
    assert!(!sheet.contains(Uniform::WeatherMap));
    assert!(!sheet.contains(Uniform::BaseNoiseTex));
    assert!(!sheet.contains(Uniform::DetailNoiseTex));
    assert!(sheet.contains(Uniform::BlueNoiseTex));
}

#[test]
fn settings_change_reaches_next_frame() {
    let mut renderer = renderer();
    let before = render_still(&mut renderer);
    assert_eq!(sheet(&before).float(Uniform::StepCount), Some(32.0));

    renderer.settings_mut().set_step_count(12.0);
    let detail = TextureHandle::new_3d(TextureId(5), 32, 32, 32);
    renderer.settings_mut().set_detail_noise(Some(detail));

    let after = render_still(&mut renderer);
    assert_eq!(sheet(&after).float(Uniform::StepCount), Some(12.0));
    assert_eq!(sheet(&after).texture(Uniform::DetailNoiseTex), Some(detail));
}

#[test]
fn replacing_settings_wholesale_reaches_next_frame() {
    let mut renderer = renderer();
    let before = render_still(&mut renderer);
    assert_eq!(sheet(&before).float(Uniform::StepCount), Some(32.0));

    let loaded: CloudSettings = toml::from_str("step_count = 5.0\ndensity_multiplier = 40.0").unwrap();
    *renderer.settings_mut() = loaded;

    let after = render_still(&mut renderer);
    assert_eq!(sheet(&after).float(Uniform::StepCount), Some(5.0));
    assert_eq!(
        sheet(&after).float(Uniform::DensityMultiplier),
        Some(ranges::DENSITY_MULTIPLIER.max)
    );
}

#[test]
fn downsample_change_reallocates_history() {
    let mut renderer = renderer();
    render_still(&mut renderer);
    let old = renderer.temporal().history().map(|h| h.id);

    renderer.settings_mut().set_downsample(Downsample::X2);
    let commands = render_still(&mut renderer);
    let new = match renderer.temporal().history() {
        Some(history) => history,
        None => panic!("history should exist"),
    };

    assert_ne!(Some(new.id), old);
    assert_eq!(new.size, (960, 540));
    assert_eq!(
        commands[1..4],
        [
            Command::ReleasePersistent {
                id: old.unwrap_or(PersistentId(0)),
            },
            Command::AllocatePersistent {
                id: new.id,
                desc: TargetDesc::new(960, 540, FilterMode::Bilinear),
            },
            Command::ClearTarget {
                target: RenderTarget::Persistent(new.id),
            },
        ]
    );
}

#[test]
fn tiny_screen_still_gets_a_one_pixel_history() {
    let mut renderer = renderer();
    renderer.settings_mut().set_downsample(Downsample::X32);
    render(
        &mut renderer,
        Frame {
            screen: (16, 8),
            ..Frame::default()
        },
    );
    assert_eq!(renderer.temporal().history().map(|h| h.size), Some((1, 1)));
}

#[test]
fn release_frees_history_once() {
    let mut renderer = renderer();
    render_still(&mut renderer);
    let id = renderer.temporal().history().map(|h| h.id);

    let mut commands = CommandBuffer::new();
    renderer.release(&mut commands);
    assert_eq!(
        commands.commands().first(),
        id.map(|id| Command::ReleasePersistent { id }).as_ref()
    );
    assert!(renderer.temporal().history().is_none());

    commands.clear();
    renderer.release(&mut commands);
    assert!(commands.is_empty());
}

#[test]
fn renderers_own_separate_history() {
    let pool = noise_pool(2);
    let mut a = CloudsRenderer::new(CloudSettings::default(), Arc::clone(&pool));
    let mut b = CloudsRenderer::new(CloudSettings::default(), pool);
    render_still(&mut a);
    render_still(&mut b);

    let a_id = a.temporal().history().map(|h| h.id);
    let b_id = b.temporal().history().map(|h| h.id);
    assert!(a_id.is_some());
    assert_ne!(a_id, b_id);
}

#[test]
fn effect_trait_drives_the_same_frame() {
    let mut renderer = renderer();
    let mut commands = CommandBuffer::new();
    {
        let effect: &mut dyn PostProcessEffect = &mut renderer;
        let mut ctx = FrameContext {
            screen_width: SCREEN.0,
            screen_height: SCREEN.1,
            camera: CameraPose::identity(),
            depth_available: true,
            scene_view: false,
            shaders: &READY,
            commands: &mut commands,
        };
        effect.render(&mut ctx);
        assert_eq!(effect.camera_flags(), DepthTextureMode::Depth);
    }
    assert_eq!(commands.len(), 9);
}
