//! GPU image-plane kernels for the strike vision core.
//!
//! Every kernel is a pure `texture_in -> texture_out` compute transform
//! dispatched on 16x16 workgroups (the two reductions run on a single
//! invocation). Intermediate planes are `R32Float` storage textures with
//! values in [0,1]; uploads stay `R8Unorm` / `Rg8Unorm`. Textures are
//! owned here and reallocated only when dimensions change.

use strike_types::{Corner, MAX_CORNER_CAPACITY};

mod pool;

use pool::{PlaneRole, TexturePool};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no compatible GPU adapter found: {0}")]
    AdapterRequest(#[from] wgpu::RequestAdapterError),
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("kernel initialization failed: {0}")]
    KernelInit(String),
    #[error("buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("readback channel closed before map completed")]
    ReadbackChannel,
    #[error("zero-sized plane requested")]
    ZeroSizedPlane,
}

/// A single-channel float plane living on the GPU.
#[derive(Debug, Clone)]
pub struct Plane {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl Plane {
    fn from_texture(texture: wgpu::Texture, width: u32, height: u32) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

struct Kernels {
    y_extract: wgpu::ComputePipeline,
    cb_extract: wgpu::ComputePipeline,
    plane_min: wgpu::ComputePipeline,
    plane_max: wgpu::ComputePipeline,
    plane_norm: wgpu::ComputePipeline,
    edge_sobel: wgpu::ComputePipeline,
    roi_crop: wgpu::ComputePipeline,
    sr_nearest: wgpu::ComputePipeline,
    chroma_boost: wgpu::ComputePipeline,
    box_blur: wgpu::ComputePipeline,
    bilateral: wgpu::ComputePipeline,
    fast9_binary: wgpu::ComputePipeline,
    fast9_score: wgpu::ComputePipeline,
}

impl Kernels {
    fn new(
        device: &wgpu::Device,
        unary_layout: &wgpu::PipelineLayout,
        norm_layout: &wgpu::PipelineLayout,
    ) -> Self {
        let make = |label: &str, layout: &wgpu::PipelineLayout, src: &str| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(src.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        Self {
            y_extract: make("y_extract", unary_layout, include_str!("shaders/y_extract.wgsl")),
            cb_extract: make(
                "cb_extract",
                unary_layout,
                include_str!("shaders/cb_extract.wgsl"),
            ),
            plane_min: make("plane_min", unary_layout, include_str!("shaders/plane_min.wgsl")),
            plane_max: make("plane_max", unary_layout, include_str!("shaders/plane_max.wgsl")),
            plane_norm: make("plane_norm", norm_layout, include_str!("shaders/plane_norm.wgsl")),
            edge_sobel: make(
                "edge_sobel",
                unary_layout,
                include_str!("shaders/edge_sobel.wgsl"),
            ),
            roi_crop: make("roi_crop", unary_layout, include_str!("shaders/roi_crop.wgsl")),
            sr_nearest: make(
                "sr_nearest",
                unary_layout,
                include_str!("shaders/sr_nearest.wgsl"),
            ),
            chroma_boost: make(
                "chroma_boost",
                unary_layout,
                include_str!("shaders/chroma_boost.wgsl"),
            ),
            box_blur: make("box_blur", unary_layout, include_str!("shaders/box_blur.wgsl")),
            bilateral: make("bilateral", unary_layout, include_str!("shaders/bilateral.wgsl")),
            fast9_binary: make(
                "fast9_binary",
                unary_layout,
                include_str!("shaders/fast9_binary.wgsl"),
            ),
            fast9_score: make(
                "fast9_score",
                unary_layout,
                include_str!("shaders/fast9_score.wgsl"),
            ),
        }
    }
}

/// Owner of the GPU device, the kernel pipelines and the texture pool.
pub struct GpuImops {
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernels: Kernels,
    pool: TexturePool,
    unary_group_layout: wgpu::BindGroupLayout,
    norm_group_layout: wgpu::BindGroupLayout,
    params_buf: wgpu::Buffer,
}

impl GpuImops {
    /// Create the device and compile every kernel. A kernel that fails
    /// validation aborts initialization; the per-frame path is total.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gpu-imops"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        let unary_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("gpu-imops unary"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::R32Float,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let norm_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gpu-imops norm"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let unary_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gpu-imops unary"),
            bind_group_layouts: &[&unary_group_layout],
            push_constant_ranges: &[],
        });
        let norm_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gpu-imops norm"),
            bind_group_layouts: &[&norm_group_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let kernels = Kernels::new(&device, &unary_layout, &norm_layout);
        if let Some(e) = device.pop_error_scope().await {
            return Err(Error::KernelInit(e.to_string()));
        }

        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gpu-imops params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::debug!("gpu-imops initialized on {:?}", adapter.get_info().name);

        Ok(Self {
            device,
            queue,
            kernels,
            pool: TexturePool::new(),
            unary_group_layout,
            norm_group_layout,
            params_buf,
        })
    }

    /// Upload the Y plane and extract it as a float plane.
    pub fn upload_y(&mut self, data: &[u8], stride: usize, width: u32, height: u32) -> Result<Plane> {
        let src = self.upload_bytes(
            PlaneRole::SrcY,
            data,
            stride,
            width,
            height,
            wgpu::TextureFormat::R8Unorm,
        )?;
        let pipeline = self.kernels.y_extract.clone();
        self.run_unary(
            &pipeline,
            &src,
            PlaneRole::YFull,
            width,
            height,
            [0.0; 4],
            (16, 16),
        )
    }

    /// Upload the interleaved CbCr plane (half resolution) and extract Cb.
    pub fn upload_cb(
        &mut self,
        data: &[u8],
        stride: usize,
        chroma_width: u32,
        chroma_height: u32,
    ) -> Result<Plane> {
        let src = self.upload_bytes(
            PlaneRole::SrcCbCr,
            data,
            stride,
            chroma_width,
            chroma_height,
            wgpu::TextureFormat::Rg8Unorm,
        )?;
        let pipeline = self.kernels.cb_extract.clone();
        self.run_unary(
            &pipeline,
            &src,
            PlaneRole::CbHalf,
            chroma_width,
            chroma_height,
            [0.0; 4],
            (16, 16),
        )
    }

    pub fn roi_crop(&mut self, src: &Plane, ox: u32, oy: u32, w: u32, h: u32) -> Result<Plane> {
        let pipeline = self.kernels.roi_crop.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Crop,
            w,
            h,
            [ox as f32, oy as f32, 0.0, 0.0],
            (16, 16),
        )
    }

    pub fn plane_min(&mut self, src: &Plane) -> Result<Plane> {
        let pipeline = self.kernels.plane_min.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::MinRed,
            1,
            1,
            [0.0; 4],
            (1, 1),
        )
    }

    pub fn plane_max(&mut self, src: &Plane) -> Result<Plane> {
        let pipeline = self.kernels.plane_max.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::MaxRed,
            1,
            1,
            [0.0; 4],
            (1, 1),
        )
    }

    /// Normalize `src` to [0,1] using its min/max reductions.
    pub fn plane_norm(&mut self, src: &Plane, min: &Plane, max: &Plane) -> Result<Plane> {
        if src.width == 0 || src.height == 0 {
            return Err(Error::ZeroSizedPlane);
        }
        let dst_tex = self.pool.texture(
            &self.device,
            PlaneRole::Norm,
            src.width,
            src.height,
            wgpu::TextureFormat::R32Float,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let dst = Plane::from_texture(dst_tex, src.width, src.height);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("plane_norm"),
            layout: &self.norm_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&min.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&max.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&dst.view),
                },
            ],
        });
        self.dispatch(&self.kernels.plane_norm, &bind_group, src.width, src.height, (16, 16));
        Ok(dst)
    }

    pub fn edge_sobel(&mut self, src: &Plane) -> Result<Plane> {
        let pipeline = self.kernels.edge_sobel.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Edge,
            src.width,
            src.height,
            [0.0; 4],
            (16, 16),
        )
    }

    /// Nearest-neighbor upscale by `scale` (> 1).
    pub fn sr_nearest(&mut self, src: &Plane, scale: f32) -> Result<Plane> {
        let w = (src.width as f32 * scale).floor() as u32;
        let h = (src.height as f32 * scale).floor() as u32;
        let pipeline = self.kernels.sr_nearest.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Sr,
            w,
            h,
            [scale, 0.0, 0.0, 0.0],
            (16, 16),
        )
    }

    /// Chroma deviation boost: `clamp(|v - 128| * gain, 0, 255)`.
    pub fn chroma_boost(&mut self, src: &Plane, gain: f32) -> Result<Plane> {
        let pipeline = self.kernels.chroma_boost.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Boost,
            src.width,
            src.height,
            [gain, 0.0, 0.0, 0.0],
            (16, 16),
        )
    }

    pub fn box_blur(&mut self, src: &Plane) -> Result<Plane> {
        let pipeline = self.kernels.box_blur.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Blur,
            src.width,
            src.height,
            [0.0; 4],
            (16, 16),
        )
    }

    pub fn bilateral(&mut self, src: &Plane) -> Result<Plane> {
        let pipeline = self.kernels.bilateral.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Blur,
            src.width,
            src.height,
            [0.0; 4],
            (16, 16),
        )
    }

    pub fn fast9_binary(&mut self, src: &Plane, threshold: u8) -> Result<Plane> {
        let pipeline = self.kernels.fast9_binary.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Fast9Binary,
            src.width,
            src.height,
            [threshold as f32 / 255.0, 0.0, 0.0, 0.0],
            (16, 16),
        )
    }

    pub fn fast9_score(&mut self, src: &Plane, threshold: u8) -> Result<Plane> {
        let pipeline = self.kernels.fast9_score.clone();
        self.run_unary(
            &pipeline,
            src,
            PlaneRole::Fast9Score,
            src.width,
            src.height,
            [threshold as f32 / 255.0, 0.0, 0.0, 0.0],
            (16, 16),
        )
    }

    /// Run both FAST-9 kernels on `src` and read back the corner list.
    ///
    /// The returned corners are in the coordinate space of `src` and
    /// capped at [`MAX_CORNER_CAPACITY`].
    pub fn fast9_corners(&mut self, src: &Plane, threshold: u8) -> Result<Vec<Corner>> {
        let binary = self.fast9_binary(src, threshold)?;
        let score = self.fast9_score(src, threshold)?;
        let bin_data = self.read_plane(&binary)?;
        let score_data = self.read_plane(&score)?;

        let mut corners = Vec::new();
        for y in 0..src.height {
            for x in 0..src.width {
                let i = (y * src.width + x) as usize;
                if bin_data[i] > 0.5 {
                    corners.push(Corner {
                        x: x as u16,
                        y: y as u16,
                        score: (score_data[i] * 255.0).round().clamp(0.0, 255.0) as u8,
                    });
                    if corners.len() >= MAX_CORNER_CAPACITY {
                        return Ok(corners);
                    }
                }
            }
        }
        Ok(corners)
    }

    /// Read a float plane back to the CPU, row padding removed.
    pub fn read_plane(&mut self, plane: &Plane) -> Result<Vec<f32>> {
        let bytes_per_row = (plane.width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let size = bytes_per_row as u64 * plane.height as u64;
        let staging = self.pool.staging(&self.device, size);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu-imops readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &plane.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: plane.width,
                height: plane.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..size);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait);
        match receiver.recv() {
            Ok(result) => result?,
            Err(_) => return Err(Error::ReadbackChannel),
        }

        let mut out = Vec::with_capacity((plane.width * plane.height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in 0..plane.height {
                let start = (row * bytes_per_row) as usize;
                let end = start + plane.width as usize * 4;
                for px in data[start..end].chunks_exact(4) {
                    out.push(f32::from_le_bytes([px[0], px[1], px[2], px[3]]));
                }
            }
        }
        staging.unmap();
        Ok(out)
    }

    fn upload_bytes(
        &mut self,
        role: PlaneRole,
        data: &[u8],
        stride: usize,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Plane> {
        if width == 0 || height == 0 {
            return Err(Error::ZeroSizedPlane);
        }
        let tex = self.pool.texture(
            &self.device,
            role,
            width,
            height,
            format,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(stride as u32),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(Plane::from_texture(tex, width, height))
    }

    fn run_unary(
        &mut self,
        pipeline: &wgpu::ComputePipeline,
        src: &Plane,
        dst_role: PlaneRole,
        dst_w: u32,
        dst_h: u32,
        params: [f32; 4],
        workgroup: (u32, u32),
    ) -> Result<Plane> {
        if dst_w == 0 || dst_h == 0 {
            return Err(Error::ZeroSizedPlane);
        }
        let dst_tex = self.pool.texture(
            &self.device,
            dst_role,
            dst_w,
            dst_h,
            wgpu::TextureFormat::R32Float,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let dst = Plane::from_texture(dst_tex, dst_w, dst_h);

        self.queue
            .write_buffer(&self.params_buf, 0, bytemuck::cast_slice(&params));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &self.unary_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&dst.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params_buf.as_entire_binding(),
                },
            ],
        });
        self.dispatch(pipeline, &bind_group, dst_w, dst_h, workgroup);
        Ok(dst)
    }

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        w: u32,
        h: u32,
        workgroup: (u32, u32),
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu-imops"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(w.div_ceil(workgroup.0), h.div_ceil(workgroup.1), 1);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}
