use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::bytes_of;
use glam::{Mat3, Vec3};
use log::{debug, info};
use wgpu::util::DeviceExt;

use super::shared::{GlobalUniform, ObjectConstants, SHADER};
use super::RenderBackend;
use crate::assets::{Geometry, Texture};
use crate::camera::ForcePerspectiveCamera;
use crate::error::RenderError;
use crate::obj::{ObjMesh, VERTEX_STRIDE};
use crate::scene::Scene;

const MSAA_SAMPLES: u32 = 4;
const FLAT_NORMAL: &str = "builtin:flat-normal";
const WHITE: &str = "builtin:white";

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

/// GPU renderer backed by wgpu that draws the crystals of a scene.
///
/// Antialiased with 4x MSAA where the surface format allows it, and
/// configured with a blending alpha mode where the platform offers one so
/// the page behind a canvas shows through.
pub struct Renderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    depth: RenderTarget,
    msaa: Option<RenderTarget>,
    pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    clear_color: wgpu::Color,
    mesh_cache: HashMap<String, MeshBuffers>,
    texture_cache: HashMap<TextureKey, wgpu::TextureView>,
    material_cache: HashMap<(TextureKey, TextureKey), wgpu::BindGroup>,
    #[cfg(target_arch = "wasm32")]
    canvas: Option<web_sys::HtmlCanvasElement>,
}

impl Renderer {
    /// Initializes the renderer for a native window.
    pub async fn for_window(window: Arc<winit::window::Window>) -> Result<Self> {
        let size = window.inner_size();
        Self::create(wgpu::SurfaceTarget::from(window), size.width, size.height).await
    }

    /// Initializes the renderer for an HTML canvas, drawing through WebGL2.
    #[cfg(target_arch = "wasm32")]
    pub async fn for_canvas(canvas: web_sys::HtmlCanvasElement) -> Result<Self> {
        let (width, height) = (canvas.width(), canvas.height());
        let mut renderer =
            Self::create(wgpu::SurfaceTarget::Canvas(canvas.clone()), width, height).await?;
        renderer.canvas = Some(canvas);
        Ok(renderer)
    }

    async fn create(target: wgpu::SurfaceTarget<'static>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("surface has zero area"));
        }

        #[cfg(target_arch = "wasm32")]
        let backends = wgpu::Backends::GL;
        #[cfg(not(target_arch = "wasm32"))]
        let backends = wgpu::Backends::PRIMARY;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(target)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        #[cfg(target_arch = "wasm32")]
        let required_limits =
            wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits());
        #[cfg(not(target_arch = "wasm32"))]
        let required_limits = wgpu::Limits::default();

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("renderer-device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let alpha_mode = [
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
        ]
        .into_iter()
        .find(|mode| surface_caps.alpha_modes.contains(mode))
        .or_else(|| surface_caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let sample_count = if adapter
            .get_texture_format_features(surface_format)
            .flags
            .sample_count_supported(MSAA_SAMPLES)
        {
            MSAA_SAMPLES
        } else {
            1
        };
        info!("surface {surface_format:?}, {sample_count}x MSAA, alpha {alpha_mode:?}");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = RenderTarget::depth(&device, width, height, sample_count);
        let msaa = (sample_count > 1)
            .then(|| RenderTarget::color(&device, &config, sample_count));

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("crystal-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = uniform_layout::<ObjectConstants>(&device, "object-bind-layout");
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-bind-layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("crystal-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("crystal-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: RenderTarget::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: sample_count,
                ..Default::default()
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mut renderer = Self {
            surface,
            device,
            queue,
            config,
            sample_count,
            depth,
            msaa,
            pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            material_layout,
            sampler,
            clear_color: wgpu::Color::BLACK,
            mesh_cache: HashMap::new(),
            texture_cache: HashMap::new(),
            material_cache: HashMap::new(),
            #[cfg(target_arch = "wasm32")]
            canvas: None,
        };
        renderer.ensure_texture(&Texture::solid(FLAT_NORMAL, [128, 128, 255, 255]), false);
        renderer.ensure_texture(&Texture::solid(WHITE, [255; 4]), true);
        Ok(renderer)
    }

    fn is_srgb(&self) -> bool {
        self.config.format.is_srgb()
    }

    fn ensure_mesh(&mut self, geometry: &Geometry) {
        if self.mesh_cache.contains_key(&geometry.name) {
            return;
        }
        debug!("uploading geometry {}", geometry.name);
        let buffers = MeshBuffers::from_mesh(&self.device, &geometry.mesh, &geometry.name);
        self.mesh_cache.insert(geometry.name.clone(), buffers);
    }

    fn ensure_texture(&mut self, texture: &Texture, srgb: bool) -> TextureKey {
        let key = TextureKey::new(&texture.name, srgb);
        if self.texture_cache.contains_key(&key) {
            return key;
        }
        debug!(
            "uploading texture {} ({}x{})",
            texture.name, texture.width, texture.height
        );
        let format = if srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let gpu_texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(&texture.name),
                size: wgpu::Extent3d {
                    width: texture.width,
                    height: texture.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &texture.rgba,
        );
        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.texture_cache.insert(key.clone(), view);
        key
    }

    fn ensure_material(&mut self, normal: &TextureKey, surface: &TextureKey) {
        let key = (normal.clone(), surface.clone());
        if self.material_cache.contains_key(&key) {
            return;
        }
        let (Some(normal_view), Some(surface_view)) =
            (self.texture_cache.get(normal), self.texture_cache.get(surface))
        else {
            return;
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material-bind-group"),
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(normal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(surface_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.material_cache.insert(key, bind_group);
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
        self.depth = RenderTarget::depth(
            &self.device,
            self.config.width,
            self.config.height,
            self.sample_count,
        );
        self.msaa = (self.sample_count > 1)
            .then(|| RenderTarget::color(&self.device, &self.config, self.sample_count));
    }
}

impl RenderBackend for Renderer {
    fn set_clear_color(&mut self, color: Vec3, alpha: f32) {
        let color = if self.is_srgb() {
            Vec3::new(
                srgb_to_linear(color.x),
                srgb_to_linear(color.y),
                srgb_to_linear(color.z),
            )
        } else {
            color
        };
        self.clear_color = wgpu::Color {
            r: color.x as f64,
            g: color.y as f64,
            b: color.z as f64,
            a: alpha as f64,
        };
    }

    #[cfg(target_arch = "wasm32")]
    fn set_surface_size(&mut self, width: u32, height: u32) {
        if let Some(canvas) = &self.canvas {
            canvas.set_width(width);
            canvas.set_height(height);
        }
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
    }

    fn render(&mut self, scene: &Scene, camera: &ForcePerspectiveCamera) -> Result<(), RenderError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure();
                return Err(RenderError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(RenderError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(other) => return Err(RenderError::Other(other.to_string())),
        };

        let uniform = GlobalUniform {
            view_proj: camera.view_proj().to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));

        // Upload anything new before the pass borrows the caches.
        let mut draw_list = Vec::with_capacity(scene.len());
        for crystal in scene.objects() {
            self.ensure_mesh(crystal.geometry());
            let normal = match crystal.normal_map() {
                Some(texture) => self.ensure_texture(texture, false),
                None => TextureKey::new(FLAT_NORMAL, false),
            };
            let surface = match crystal.surface_map() {
                Some(texture) => self.ensure_texture(texture, true),
                None => TextureKey::new(WHITE, true),
            };
            self.ensure_material(&normal, &surface);

            let model = crystal.model_matrix();
            let normal_matrix = Mat3::from_mat4(model).inverse().transpose();
            let constants = ObjectConstants {
                model: model.to_cols_array_2d(),
                normal: mat3_to_3x4(normal_matrix),
                params: [crystal.hue(), crystal.time(), crystal.phase(), 0.0],
            };
            let object_buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("object-uniform"),
                    contents: bytes_of(&constants),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let object_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object-bind-group"),
                layout: &self.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: object_buffer.as_entire_binding(),
                }],
            });
            draw_list.push((
                crystal.geometry().name.clone(),
                (normal, surface),
                object_bind_group,
            ));
        }

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (target_view, resolve_target) = match &self.msaa {
            Some(msaa) => (&msaa.view, Some(&view)),
            None => (&view, None),
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("crystal-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target_view,
                depth_slice: None,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.global_bind_group, &[]);

        for (mesh_name, material_key, object_bind_group) in &draw_list {
            let (Some(mesh), Some(material)) = (
                self.mesh_cache.get(mesh_name),
                self.material_cache.get(material_key),
            ) else {
                continue;
            };
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, object_bind_group, &[]);
            pass.set_bind_group(2, material, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
            },
            count: None,
        }],
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Cache key of an uploaded texture. The same image uploaded as colour
/// (sRGB) and as data (linear) yields two distinct GPU textures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TextureKey {
    name: String,
    srgb: bool,
}

impl TextureKey {
    fn new(name: &str, srgb: bool) -> Self {
        Self {
            name: name.to_string(),
            srgb,
        }
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &ObjMesh, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

/// Offscreen attachment sized to the surface.
struct RenderTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl RenderTarget {
    const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn depth(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        Self::create(
            device,
            "depth-texture",
            width,
            height,
            sample_count,
            Self::DEPTH_FORMAT,
        )
    }

    fn color(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration, sample_count: u32) -> Self {
        Self::create(
            device,
            "msaa-texture",
            config.width,
            config.height,
            sample_count,
            config.format,
        )
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        sample_count: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
