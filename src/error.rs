//! Error type shared by the renderer, the GPU context and the app shell.

/// Errors produced while setting up or driving the renderer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported texture formats")]
    NoSurfaceFormat,

    #[error("viewport {width}x{height} needs over {max_bytes} bytes for one fragment per pixel")]
    ViewportTooLarge {
        width: u32,
        height: u32,
        max_bytes: u64,
    },

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("unknown transparency method `{0}` (expected alpha, kbuffer2 or kbuffer4)")]
    UnknownMethod(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error(transparent)]
    EventLoop(#[from] winit::error::EventLoopError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
