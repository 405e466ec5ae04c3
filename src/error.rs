use thiserror::Error;

/// Failure while fetching or decoding one of the sketch assets.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to fetch {path}: {message}")]
    Fetch { path: String, message: String },
    #[error("failed to decode texture {path}")]
    Texture {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to parse mesh {path}: {message}")]
    Mesh { path: String, message: String },
    #[error("mesh {path} has {found} sub-geometries, at least {required} are required")]
    MissingGeometry {
        path: String,
        found: usize,
        required: usize,
    },
}

/// Failure reported by a render backend while drawing a frame.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The surface must be reconfigured before the next frame.
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("surface timed out")]
    Timeout,
    #[error("GPU is out of memory")]
    OutOfMemory,
    #[error("render failed: {0}")]
    Other(String),
}

impl RenderError {
    /// Errors after which the render loop cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::OutOfMemory)
    }
}

#[derive(Debug, Error)]
pub enum SketchError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
