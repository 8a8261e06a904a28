use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use log::debug;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::common::{CameraParams, LightParams};
use crate::camera::PerspectiveCamera;
use crate::mesh::{MeshData, Vertex};
use crate::scene::{Material, Scene};
use crate::texture::Texture;

/// GPU renderer backed by wgpu that draws the backdrop scene into a window.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    mesh_cache: GeometryCache<MeshBuffers>,
    texture_cache: HashMap<String, wgpu::BindGroup>,
    white_texture: wgpu::BindGroup,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("backdrop-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
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
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("backdrop-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = uniform_layout::<ObjectConstants>(&device, "object-bind-layout");
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("backdrop-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout, &texture_layout],
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

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("backdrop-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white_texture = upload_texture(
            &device,
            &queue,
            &texture_layout,
            &sampler,
            &Texture::solid("white", [255, 255, 255, 255]),
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            shader,
            pipeline_layout,
            pipelines: HashMap::new(),
            global_buffer,
            global_bind_group,
            object_layout,
            texture_layout,
            sampler,
            mesh_cache: GeometryCache::default(),
            texture_cache: HashMap::new(),
            white_texture,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Reconfigures the surface after it was lost or went stale.
    pub fn reconfigure(&mut self) {
        self.resize(self.size);
    }

    fn update_globals(&self, camera: &CameraParams, light: &LightParams) {
        let uniform = GlobalUniform {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            ambient: srgb_to_linear(light.ambient).extend(1.0).into(),
            light_direction: light.direction.extend(0.0).into(),
            light_color: srgb_to_linear(light.directional).extend(1.0).into(),
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    /// Draws every visible mesh of `scene` as seen from `camera`.
    pub fn render(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
    ) -> Result<(), wgpu::SurfaceError> {
        self.update_globals(&CameraParams::from_camera(camera), &LightParams::from_scene(scene));

        let evicted = self.mesh_cache.evict_dropped();
        if evicted > 0 {
            debug!("released {evicted} mesh buffer(s)");
        }

        let draws = collect_draws(scene);
        for draw in &draws {
            self.ensure_mesh_uploaded(draw.geometry);
            if let Some(texture) = draw.material.texture.as_ref() {
                self.ensure_texture_uploaded(texture);
            }
            self.ensure_pipeline(draw.key);
        }

        let object_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|draw| {
                let constants = ObjectConstants::new(draw.model, draw.material);
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("object-uniform"),
                        contents: bytes_of(&constants),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("object-bind-group"),
                    layout: &self.object_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("backdrop-encoder"),
            });

        let background = srgb_to_linear(scene.background);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("backdrop-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: background.x as f64,
                        g: background.y as f64,
                        b: background.z as f64,
                        a: 1.0,
                    }),
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

        pass.set_bind_group(0, &self.global_bind_group, &[]);
        for (draw, object_group) in draws.iter().zip(&object_groups) {
            let (Some(pipeline), Some(mesh)) = (
                self.pipelines.get(&draw.key),
                self.mesh_cache.get(draw.geometry),
            ) else {
                continue;
            };
            let texture = draw
                .material
                .texture
                .as_ref()
                .and_then(|texture| self.texture_cache.get(&texture.path))
                .unwrap_or(&self.white_texture);

            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, object_group, &[]);
            pass.set_bind_group(2, texture, &[]);
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(draw.range.clone(), 0, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn ensure_mesh_uploaded(&mut self, geometry: &Arc<MeshData>) {
        let device = &self.device;
        self.mesh_cache
            .get_or_insert_with(geometry, || MeshBuffers::from_mesh(device, geometry));
    }

    fn ensure_texture_uploaded(&mut self, texture: &Texture) {
        if self.texture_cache.contains_key(&texture.path) {
            return;
        }
        debug!(
            "uploading texture {} ({}x{})",
            texture.path, texture.width, texture.height
        );
        let bind_group = upload_texture(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            texture,
        );
        self.texture_cache.insert(texture.path.clone(), bind_group);
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let pipeline = create_pipeline(
            &self.device,
            &self.pipeline_layout,
            &self.shader,
            self.config.format,
            key,
        );
        self.pipelines.insert(key, pipeline);
    }
}

/// Fixed-function state a material needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    blend: bool,
    depth_write: bool,
    double_sided: bool,
}

impl PipelineKey {
    fn for_material(material: &Material) -> Self {
        Self {
            blend: material.transparent,
            depth_write: material.depth_write,
            double_sided: material.double_sided,
        }
    }
}

/// One indexed draw: a material slot of a mesh.
struct DrawItem<'a> {
    model: Mat4,
    geometry: &'a Arc<MeshData>,
    material: &'a Material,
    range: Range<u32>,
    key: PipelineKey,
}

/// Opaque slots first, then blended ones, each in scene order. Fully
/// transparent slots are skipped.
fn collect_draws(scene: &Scene) -> Vec<DrawItem<'_>> {
    let mut opaque = Vec::new();
    let mut blended = Vec::new();
    for (model, mesh) in scene.meshes() {
        for slot in 0..mesh.geometry.material_slots() {
            let (Some(material), Some(range)) = (mesh.material(slot), mesh.geometry.group_range(slot))
            else {
                continue;
            };
            if material.transparent && material.opacity <= 0.0 {
                continue;
            }
            let draw = DrawItem {
                model,
                geometry: &mesh.geometry,
                material,
                range,
                key: PipelineKey::for_material(material),
            };
            if material.transparent {
                blended.push(draw);
            } else {
                opaque.push(draw);
            }
        }
    }
    opaque.append(&mut blended);
    opaque
}

/// Per-geometry GPU resources keyed by `Arc` identity.
///
/// Each entry holds a `Weak` to its geometry, so the allocation behind the
/// key stays reserved while the entry exists and the geometry itself is
/// free to drop. Entries whose geometry is gone are removed by
/// [`GeometryCache::evict_dropped`].
struct GeometryCache<T> {
    entries: HashMap<usize, (Weak<MeshData>, T)>,
}

impl<T> Default for GeometryCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> GeometryCache<T> {
    fn get(&self, geometry: &Arc<MeshData>) -> Option<&T> {
        self.entries
            .get(&geometry_key(geometry))
            .map(|(_, value)| value)
    }

    fn get_or_insert_with(&mut self, geometry: &Arc<MeshData>, create: impl FnOnce() -> T) -> &T {
        let (_, value) = self
            .entries
            .entry(geometry_key(geometry))
            .or_insert_with(|| (Arc::downgrade(geometry), create()));
        value
    }

    /// Drops entries whose geometry has no strong references left. Returns
    /// how many were removed.
    fn evict_dropped(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (geometry, _)| geometry.strong_count() > 0);
        before - self.entries.len()
    }
}

fn geometry_key(geometry: &Arc<MeshData>) -> usize {
    Arc::as_ptr(geometry) as usize
}

/// Converts an sRGB-encoded colour to linear space.
fn srgb_to_linear(color: Vec3) -> Vec3 {
    let channel = |c: f32| {
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    Vec3::new(channel(color.x), channel(color.y), channel(color.z))
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

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("backdrop-pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x3,
                    1 => Float32x3,
                    2 => Float32x2
                ],
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: (!key.double_sided).then_some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: key.depth_write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: key.blend.then_some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    texture: &Texture,
) -> wgpu::BindGroup {
    let size = wgpu::Extent3d {
        width: texture.width.max(1),
        height: texture.height.max(1),
        depth_or_array_layers: 1,
    };
    let gpu_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(texture.path.as_str()),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        gpu_texture.as_image_copy(),
        &texture.pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * size.width),
            rows_per_image: Some(size.height),
        },
        size,
    );
    let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("texture-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, geometry: &MeshData) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-vertices"),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-indices"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { vertex, index }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
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

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    ambient: [f32; 4],
    light_direction: [f32; 4],
    light_color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    uv_transform: [[f32; 4]; 3],
    color: [f32; 4],
    flags: [f32; 4],
}

impl ObjectConstants {
    fn new(model: Mat4, material: &Material) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let uv_transform = material
            .texture
            .as_ref()
            .map_or(Mat3::IDENTITY, |texture| texture.uv_transform);
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            uv_transform: mat3_to_3x4(uv_transform),
            color: srgb_to_linear(material.color)
                .extend(material.opacity.clamp(0.0, 1.0))
                .into(),
            flags: [if material.lit { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

const SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    ambient: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    uv_transform: mat3x4<f32>,
    color: vec4<f32>,
    flags: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

@group(2) @binding(0)
var face_texture: texture_2d<f32>;
@group(2) @binding(1)
var face_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);

    let uv_transform = mat3x3<f32>(
        object.uv_transform[0].xyz,
        object.uv_transform[1].xyz,
        object.uv_transform[2].xyz
    );
    out.uv = (uv_transform * vec3<f32>(input.uv, 1.0)).xy;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(face_texture, face_sampler, input.uv);
    var rgb = texel.rgb * object.color.rgb;
    if object.flags.x > 0.5 {
        let diffuse = max(dot(normalize(input.normal), globals.light_direction.xyz), 0.0);
        rgb = rgb * (globals.ambient.rgb + diffuse * globals.light_color.rgb);
    }
    return vec4<f32>(rgb, texel.a * object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::panorama::INWARD_UV_TRANSFORM;
    use crate::scene::{Mesh, SceneNode};

    fn panorama_mesh(opacity: f32) -> SceneNode {
        let mut texture = Texture::solid("face", [255, 255, 255, 255]);
        texture.set_uv_transform(INWARD_UV_TRANSFORM);
        let mut material = Material::panorama_face(texture);
        material.opacity = opacity;
        SceneNode::mesh(
            "panorama-box",
            Mesh::new(Arc::new(MeshData::cuboid(Vec3::splat(1000.0))), vec![material; 6]),
        )
    }

    fn squid() -> SceneNode {
        SceneNode::mesh(
            "squid",
            Mesh::new(
                Arc::new(MeshData::cuboid(Vec3::ONE)),
                vec![Material::lit(Vec3::ONE)],
            ),
        )
    }

    #[test]
    fn geometry_cache_shares_entries_between_clones() {
        let mut cache = GeometryCache::default();
        let geometry = Arc::new(MeshData::cuboid(Vec3::ONE));
        let alias = Arc::clone(&geometry);
        let mut uploads = 0;
        cache.get_or_insert_with(&geometry, || {
            uploads += 1;
            7
        });
        cache.get_or_insert_with(&alias, || {
            uploads += 1;
            8
        });
        assert_eq!(uploads, 1);
        assert_eq!(cache.get(&alias), Some(&7));
        assert!(cache.get(&Arc::new(MeshData::cuboid(Vec3::ONE))).is_none());
    }

    #[test]
    fn geometry_cache_releases_dropped_meshes() {
        let mut cache = GeometryCache::default();
        let kept = Arc::new(MeshData::cuboid(Vec3::ONE));
        let dropped = Arc::new(MeshData::cuboid(Vec3::splat(2.0)));
        cache.get_or_insert_with(&kept, || "kept");
        cache.get_or_insert_with(&dropped, || "dropped");

        assert_eq!(cache.evict_dropped(), 0);
        drop(dropped);
        assert_eq!(cache.evict_dropped(), 1);
        assert_eq!(cache.entries.len(), 1);
        assert_eq!(cache.get(&kept), Some(&"kept"));

        // A fresh geometry never picks up buffers from an evicted one.
        let replacement = Arc::new(MeshData::cuboid(Vec3::splat(2.0)));
        assert!(cache.get(&replacement).is_none());
    }

    #[test]
    fn invisible_faces_are_not_drawn() {
        let mut scene = Scene::new(Vec3::ZERO);
        scene.add(panorama_mesh(0.0));
        assert!(collect_draws(&scene).is_empty());
    }

    #[test]
    fn opaque_draws_precede_blended_ones() {
        let mut scene = Scene::new(Vec3::ZERO);
        scene.add(panorama_mesh(0.5));
        scene.add(squid());

        let draws = collect_draws(&scene);
        // One draw per cube face; the squid reuses its only material.
        assert_eq!(draws.len(), 12);
        assert!(draws[..6].iter().all(|draw| !draw.key.blend && draw.key.depth_write));
        assert_eq!(draws[0].range, 0..6);
        assert!(draws[6..].iter().all(|draw| draw.key.blend && !draw.key.depth_write));
        assert_eq!(draws[11].range, 30..36);
    }

    #[test]
    fn object_constants_carry_material_state() {
        let mut scene = Scene::new(Vec3::ZERO);
        scene.add(panorama_mesh(0.25));
        let draws = collect_draws(&scene);
        let constants = ObjectConstants::new(draws[0].model, draws[0].material);
        assert_eq!(constants.color[3], 0.25);
        assert_eq!(constants.flags[0], 0.0);

        // Column 0 of the UV transform mirrors u.
        let uv = Mat3::from_cols(
            Vec3::from_slice(&constants.uv_transform[0][..3]),
            Vec3::from_slice(&constants.uv_transform[1][..3]),
            Vec3::from_slice(&constants.uv_transform[2][..3]),
        )
        .transform_point2(Vec2::new(0.25, 0.5));
        assert_eq!(uv, Vec2::new(0.75, 0.5));
    }

    #[test]
    fn srgb_conversion_keeps_extremes() {
        assert_eq!(srgb_to_linear(Vec3::ZERO), Vec3::ZERO);
        assert!((srgb_to_linear(Vec3::ONE) - Vec3::ONE).length() < 1e-6);
        assert!(srgb_to_linear(Vec3::splat(0.5)).x < 0.5);
    }
}
