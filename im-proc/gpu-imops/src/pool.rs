use std::collections::HashMap;

/// Identifies the slot a texture occupies in the per-frame pipeline.
/// One texture lives per role; it is reallocated only when the
/// dimensions for that role change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PlaneRole {
    SrcY,
    SrcCbCr,
    YFull,
    CbHalf,
    Crop,
    MinRed,
    MaxRed,
    Norm,
    Edge,
    Boost,
    Blur,
    Sr,
    Fast9Binary,
    Fast9Score,
}

pub(crate) struct TexturePool {
    textures: HashMap<PlaneRole, (u32, u32, wgpu::Texture)>,
    staging: Option<(u64, wgpu::Buffer)>,
}

impl TexturePool {
    pub(crate) fn new() -> Self {
        Self {
            textures: HashMap::new(),
            staging: None,
        }
    }

    pub(crate) fn texture(
        &mut self,
        device: &wgpu::Device,
        role: PlaneRole,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> wgpu::Texture {
        if let Some((w, h, tex)) = self.textures.get(&role) {
            if *w == width && *h == height {
                return tex.clone();
            }
        }
        let tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gpu-imops plane"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        self.textures.insert(role, (width, height, tex.clone()));
        tex
    }

    /// Readback staging buffer, grown when a larger request arrives.
    pub(crate) fn staging(&mut self, device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        if let Some((cap, buf)) = &self.staging {
            if *cap >= size {
                return buf.clone();
            }
        }
        let buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gpu-imops staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.staging = Some((size, buf.clone()));
        buf
    }
}
