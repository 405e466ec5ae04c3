use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use log::{debug, info};

use crate::error::AssetError;
use crate::obj::{load_obj_group_from_str, ObjMesh};

/// Number of distinct crystal shapes the mesh asset must provide.
pub const GEOMETRY_VARIANTS: usize = 3;

/// A load that has been issued but not yet awaited.
pub type PendingAsset = Pin<Box<dyn Future<Output = Result<Vec<u8>, AssetError>>>>;

/// Anything that can fetch raw asset bytes by relative path.
///
/// `request` must issue the load immediately so that several requests made
/// before awaiting any of them proceed in parallel.
pub trait AssetSource {
    fn request(&self, path: &str) -> PendingAsset;
}

/// Decoded RGBA8 image ready for GPU upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// Path the texture was loaded from; renderers cache GPU copies by it.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Texture {
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self, AssetError> {
        let image = image::load_from_memory(bytes).map_err(|source| AssetError::Texture {
            path: name.to_string(),
            source,
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("decoded texture {name} ({width}x{height})");
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }

    /// Single-colour texture, used where no image is bound.
    pub fn solid(name: &str, color: [u8; 4]) -> Self {
        Self {
            name: name.to_string(),
            width: 1,
            height: 1,
            rgba: color.to_vec(),
        }
    }
}

/// Shared mesh variant. The renderer caches GPU buffers by `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub name: String,
    pub mesh: ObjMesh,
}

/// Everything `init` needs to build the crystal ring.
#[derive(Debug, Clone)]
pub struct CrystalAssets {
    pub geometries: Vec<Arc<Geometry>>,
    pub normal_map: Arc<Texture>,
    pub surface_map: Arc<Texture>,
}

/// Paths of the three assets, relative to the asset source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub model: String,
    pub normal_map: String,
    pub surface_map: String,
}

impl CrystalAssets {
    /// Requests the mesh group and both textures at once, then waits for all
    /// of them. The first failure is returned.
    pub async fn load(source: &dyn AssetSource, paths: &AssetPaths) -> Result<Self, AssetError> {
        let model = source.request(&paths.model);
        let normal = source.request(&paths.normal_map);
        let surface = source.request(&paths.surface_map);

        let model = model.await?;
        let normal = normal.await?;
        let surface = surface.await?;

        let geometries = parse_geometries(&paths.model, &model)?;
        let normal_map = Arc::new(Texture::from_bytes(&paths.normal_map, &normal)?);
        let surface_map = Arc::new(Texture::from_bytes(&paths.surface_map, &surface)?);
        info!(
            "loaded {} crystal geometries from {}",
            geometries.len(),
            paths.model
        );
        Ok(Self {
            geometries,
            normal_map,
            surface_map,
        })
    }
}

fn parse_geometries(path: &str, bytes: &[u8]) -> Result<Vec<Arc<Geometry>>, AssetError> {
    let text = std::str::from_utf8(bytes).map_err(|err| AssetError::Mesh {
        path: path.to_string(),
        message: format!("not valid UTF-8: {err}"),
    })?;
    let group = load_obj_group_from_str(text).map_err(|err| AssetError::Mesh {
        path: path.to_string(),
        message: format!("{err:#}"),
    })?;
    if group.children.len() < GEOMETRY_VARIANTS {
        return Err(AssetError::MissingGeometry {
            path: path.to_string(),
            found: group.children.len(),
            required: GEOMETRY_VARIANTS,
        });
    }
    Ok(group
        .children
        .into_iter()
        .map(|mesh| {
            Arc::new(Geometry {
                name: format!("{path}#{}", mesh.name),
                mesh,
            })
        })
        .collect())
}

/// Reads assets from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectorySource {
    fn request(&self, path: &str) -> PendingAsset {
        let full_path = self.root.join(path.trim_start_matches('/'));
        let result = std::fs::read(&full_path).map_err(|err| AssetError::Fetch {
            path: full_path.display().to_string(),
            message: err.to_string(),
        });
        Box::pin(std::future::ready(result))
    }
}

/// Serves assets from memory; missing paths fail like a 404.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn with_file(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl AssetSource for MemorySource {
    fn request(&self, path: &str) -> PendingAsset {
        let result = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::Fetch {
                path: path.to_string(),
                message: "not found".to_string(),
            });
        Box::pin(std::future::ready(result))
    }
}

#[cfg(target_arch = "wasm32")]
pub use fetch::FetchSource;

#[cfg(target_arch = "wasm32")]
mod fetch {
    use js_sys::{Promise, Uint8Array};
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::Response;

    use super::{AssetSource, PendingAsset};
    use crate::error::AssetError;

    /// Fetches assets over HTTP relative to a base URL.
    #[derive(Debug, Clone)]
    pub struct FetchSource {
        base_url: String,
    }

    impl FetchSource {
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    impl AssetSource for FetchSource {
        fn request(&self, path: &str) -> PendingAsset {
            let url = self.url(path);
            let promise: Result<Promise, AssetError> = web_sys::window()
                .ok_or_else(|| fetch_error(&url, "window not available".to_string()))
                .map(|window| window.fetch_with_str(&url));
            Box::pin(async move {
                let response = JsFuture::from(promise?)
                    .await
                    .map_err(|err| fetch_error(&url, format!("{err:?}")))?
                    .dyn_into::<Response>()
                    .map_err(|_| fetch_error(&url, "fetch did not return a Response".to_string()))?;
                if !response.ok() {
                    return Err(fetch_error(&url, format!("HTTP {}", response.status())));
                }
                let buffer = response
                    .array_buffer()
                    .map_err(|err| fetch_error(&url, format!("{err:?}")))?;
                let buffer = JsFuture::from(buffer)
                    .await
                    .map_err(|err| fetch_error(&url, format!("{err:?}")))?;
                Ok(Uint8Array::new(&buffer).to_vec())
            })
        }
    }

    fn fetch_error(url: &str, message: String) -> AssetError {
        AssetError::Fetch {
            path: url.to_string(),
            message,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pollster::block_on;

    pub(crate) const SHARDS_OBJ: &str = "
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
o ShardA
f 1 2 3
o ShardB
f 1 2 4
o ShardC
f 1 3 4
";

    pub(crate) fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba(color));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .expect("encode png");
        bytes.into_inner()
    }

    pub(crate) fn paths() -> AssetPaths {
        AssetPaths {
            model: "model/crystal.obj".to_string(),
            normal_map: "img/normal.jpg".to_string(),
            surface_map: "img/surface.jpg".to_string(),
        }
    }

    pub(crate) fn complete_source() -> MemorySource {
        MemorySource::new()
            .with_file("model/crystal.obj", SHARDS_OBJ)
            .with_file("img/normal.jpg", png_bytes([128, 128, 255, 255]))
            .with_file("img/surface.jpg", png_bytes([200, 220, 255, 255]))
    }

    #[test]
    fn loads_all_three_assets() {
        let assets = block_on(CrystalAssets::load(&complete_source(), &paths())).unwrap();
        assert_eq!(assets.geometries.len(), 3);
        assert_eq!(assets.geometries[1].name, "model/crystal.obj#ShardB");
        assert_eq!(assets.normal_map.width, 2);
        assert_eq!(&assets.normal_map.rgba[..4], [128, 128, 255, 255]);
        assert_eq!(assets.surface_map.name, "img/surface.jpg");
    }

    #[test]
    fn missing_texture_fails_the_whole_load() {
        let mut source = complete_source();
        source.files.remove("img/surface.jpg");
        let err = block_on(CrystalAssets::load(&source, &paths())).unwrap_err();
        assert!(matches!(err, AssetError::Fetch { ref path, .. } if path == "img/surface.jpg"));
    }

    #[test]
    fn undecodable_texture_is_reported() {
        let source = complete_source().with_file("img/normal.jpg", b"not an image".to_vec());
        let err = block_on(CrystalAssets::load(&source, &paths())).unwrap_err();
        assert!(matches!(err, AssetError::Texture { .. }));
    }

    #[test]
    fn too_few_geometries_is_an_error() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\no A\nf 1 2 3\no B\nf 1 3 2\n";
        let source = complete_source().with_file("model/crystal.obj", obj);
        let err = block_on(CrystalAssets::load(&source, &paths())).unwrap_err();
        assert!(matches!(
            err,
            AssetError::MissingGeometry {
                found: 2,
                required: 3,
                ..
            }
        ));
    }

    #[test]
    fn directory_source_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("model")).unwrap();
        std::fs::write(dir.path().join("model/crystal.obj"), SHARDS_OBJ).unwrap();
        let source = DirectorySource::new(dir.path());
        let bytes = block_on(source.request("/model/crystal.obj")).unwrap();
        assert_eq!(bytes, SHARDS_OBJ.as_bytes());
        assert!(block_on(source.request("missing.png")).is_err());
    }
}
