//! Decorative ring of animated crystals viewed by a slowly drifting camera.
//!
//! [`SceneController`] owns the scene and runs the frame loop against two
//! seams: a [`Host`] that supplies time and frame callbacks, and a
//! [`RenderBackend`] that draws. The native binary drives it from a winit
//! window, the browser build from `requestAnimationFrame`, and tests from a
//! manual clock with the [`HeadlessRenderer`].

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
pub mod assets;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controller;
pub mod crystal;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod obj;
pub mod render;
pub mod scene;
pub mod timer;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use assets::{
    AssetPaths, AssetSource, CrystalAssets, DirectorySource, Geometry, MemorySource, Texture,
};
pub use camera::{ForcePerspectiveCamera, ViewOffset};
pub use clock::Clock;
pub use config::SketchConfig;
pub use controller::{camera_view_offset, Host, SceneController};
pub use crystal::Crystal;
pub use error::{AssetError, RenderError, SketchError};
pub use lifecycle::Lifecycle;
pub use logging::{init_logging, LoggingConfig};
pub use obj::{load_obj_group_from_str, ObjGroup, ObjMesh};
pub use render::{FrameRecord, HeadlessRenderer, RenderBackend, Renderer};
pub use scene::Scene;
pub use timer::IntervalTimer;
