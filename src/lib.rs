//! Screen-space volumetric clouds for a post-processing stack.
//!
//! [`CloudsRenderer`] records each frame's passes into a [`CommandBuffer`];
//! the host replays them. The wgpu backend ([`CommandExecutor`],
//! [`CloudsKernel`]) is one such host.

mod error;
pub use error::*;

mod uniforms;
pub use uniforms::*;

mod settings;
pub use settings::{ranges, CloudSettings, Downsample, ParamRange};

mod commands;
pub use commands::*;

mod blue_noise;
pub use blue_noise::*;

mod temporal;
pub use temporal::*;

mod post_processing;
pub use post_processing::*;

mod clouds;
pub use clouds::*;

mod debug;
pub use debug::*;

mod config;
pub use config::*;

mod textures;
pub use textures::*;

mod shader;
pub use shader::*;

mod kernel;
pub use kernel::*;

mod executor;
pub use executor::*;
