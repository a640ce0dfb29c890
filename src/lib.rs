//! # Strata
//!
//! **Order-independent transparency with a K-buffer, on wgpu.**
//!
//! Translucent geometry is rendered three ways and can be switched at
//! runtime:
//!
//! - [`TransparencyMethod::AlphaBlending`]: hardware blending in submission
//!   order, wrong wherever surfaces intersect;
//! - [`TransparencyMethod::KBuffer2`] and [`TransparencyMethod::KBuffer4`]:
//!   every translucent fragment is captured per pixel, then reduced to the
//!   nearest 2 or 4 layers (farther ones merged into the last) and resolved
//!   front to back over the opaque scene.
//!
//! The layer algorithm lives on the host in [`kbuffer`] as well, where it is
//! tested against exact sorted compositing. The WGSL build pass follows it
//! step for step.
//!
//! ## Quick Start
//!
//! ```no_run
//! use strata::{AppConfig, TransparencyMethod};
//!
//! fn main() -> strata::Result<()> {
//!     strata::run(AppConfig::new().method(TransparencyMethod::KBuffer2).size(1280, 720))
//! }
//! ```
//!
//! In the window, `1`, `2` and `4` pick a method, `Space` cycles methods,
//! `V` cycles the debug views, `P` pauses the animation and the arrow keys
//! move the camera.

mod app;
mod camera;
mod composite_pass;
mod config;
mod demo;
mod error;
mod gpu;
pub mod kbuffer;
mod kbuffer_pass;
mod mesh;
mod mesh_pass;
mod method;
mod renderer;
mod scene;
pub mod shader_types;
mod targets;
mod texture;

pub use app::run;
pub use camera::{Camera, OrbitCamera};
pub use config::{AppConfig, DEFAULT_FRAGMENT_CAPACITY, METHOD_ENV};
pub use demo::DemoScene;
pub use error::{Error, Result};
pub use gpu::GpuContext;
pub use mesh::{Mesh, MeshData, MeshId, MeshLibrary};
pub use mesh_pass::MaterialSlot;
pub use method::TransparencyMethod;
pub use renderer::{KBufferTargets, Renderer};
pub use scene::{Drawable, Scene, Surface};
pub use shader_types::ViewMode;
pub use targets::KBufferFormats;
pub use texture::Texture;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec3};
