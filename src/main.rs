use crate::app::App;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use volumetric_clouds::{ViewerConfig, DEFAULT_CONFIG_FILE};
use winit::event_loop::{ControlFlow, EventLoop};

mod app;
mod camera;
mod input;
mod wgpu_ctx;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ViewerConfig::load_or_default(DEFAULT_CONFIG_FILE)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}
