use std::collections::HashMap;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::backend::{
    Capabilities, DrawCall, FieldSnapshot, Output, ProgramId, RenderBackend, TargetDescriptor,
    TargetId,
};
use crate::compile::LinkedProgram;
use crate::error::BackendError;
use crate::types::{Channels, FilterMode, Precision, TextureFormat};

use super::context::GpuContext;
use super::pipeline::ProgramPipelines;

struct GpuTarget {
    descriptor: TargetDescriptor,
    format: wgpu::TextureFormat,
    /// `None` when the device cannot render into `format`.
    texture: Option<(wgpu::Texture, wgpu::TextureView)>,
}

struct SurfaceFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// wgpu implementation drawing into a window surface.
///
/// Passes are recorded into one encoder per frame and submitted together with
/// the surface present in [`RenderBackend::end_frame`].
pub struct GpuBackend {
    context: GpuContext,
    programs: HashMap<ProgramId, ProgramPipelines>,
    targets: HashMap<TargetId, GpuTarget>,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<SurfaceFrame>,
    next_id: u32,
}

pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match (format.channels, format.precision) {
        (Channels::R, Precision::Full) => wgpu::TextureFormat::R32Float,
        (Channels::Rg, Precision::Full) => wgpu::TextureFormat::Rg32Float,
        (Channels::Rgba, Precision::Full) => wgpu::TextureFormat::Rgba32Float,
        (Channels::R, Precision::Half) => wgpu::TextureFormat::R16Float,
        (Channels::Rg, Precision::Half) => wgpu::TextureFormat::Rg16Float,
        (Channels::Rgba, Precision::Half) => wgpu::TextureFormat::Rgba16Float,
    }
}

fn create_sampler(device: &wgpu::Device, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("field sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

impl GpuBackend {
    pub fn new<T>(target: &T, size: PhysicalSize<u32>) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size)?;
        let linear_sampler = create_sampler(&context.device, wgpu::FilterMode::Linear);
        let nearest_sampler = create_sampler(&context.device, wgpu::FilterMode::Nearest);
        Ok(Self {
            context,
            programs: HashMap::new(),
            targets: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            encoder: None,
            frame: None,
            next_id: 1,
        })
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.frame = None;
        self.context.resize(size);
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn acquire_frame(&mut self) -> Result<(), BackendError> {
        if self.frame.is_some() {
            return Ok(());
        }
        match self.context.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some(SurfaceFrame { texture, view });
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                Err(BackendError::SurfaceLost)
            }
            Err(wgpu::SurfaceError::Timeout) => Err(BackendError::SurfaceLost),
            Err(other) => Err(BackendError::Surface(other.to_string())),
        }
    }

    fn output_view(
        &self,
        output: Output,
    ) -> Result<(&wgpu::TextureView, wgpu::TextureFormat), BackendError> {
        match output {
            Output::Target(id) => {
                let target = self
                    .targets
                    .get(&id)
                    .ok_or(BackendError::UnknownTarget(id))?;
                let (_, view) = target
                    .texture
                    .as_ref()
                    .ok_or(BackendError::IncompleteTarget(id))?;
                Ok((view, target.format))
            }
            Output::Surface => {
                let frame = self.frame.as_ref().ok_or(BackendError::SurfaceLost)?;
                Ok((&frame.view, self.context.surface_format))
            }
        }
    }
}

impl RenderBackend for GpuBackend {
    fn capabilities(&self) -> Capabilities {
        self.context.capabilities
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, BackendError> {
        let pipelines = ProgramPipelines::new(
            &self.context.device,
            program,
            self.context.capabilities.linear_filtering,
        );
        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, pipelines);
        Ok(id)
    }

    fn delete_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, BackendError> {
        let limit = self.max_texture_dimension();
        if descriptor.width > limit || descriptor.height > limit {
            return Err(BackendError::TooLarge {
                width: descriptor.width,
                height: descriptor.height,
            });
        }
        let format = texture_format(descriptor.format);
        let texture = if self.context.format_renderable(format) {
            let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(descriptor.label),
                size: wgpu::Extent3d {
                    width: descriptor.width.max(1),
                    height: descriptor.height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Some((texture, view))
        } else {
            tracing::debug!(?format, label = descriptor.label, "format is not renderable");
            None
        };
        let id = TargetId(self.allocate_id());
        self.targets.insert(
            id,
            GpuTarget {
                descriptor: *descriptor,
                format,
                texture,
            },
        );
        Ok(id)
    }

    fn target_complete(&self, id: TargetId) -> bool {
        self.targets
            .get(&id)
            .is_some_and(|target| target.texture.is_some())
    }

    fn delete_target(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    fn clear(&mut self, output: Output, color: [f32; 4]) -> Result<(), BackendError> {
        if output == Output::Surface {
            self.acquire_frame()?;
        }
        let (view, _) = self.output_view(output)?;
        let view = view.clone();
        let encoder = self.encoder.get_or_insert_with(|| {
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("fluid encoder"),
                })
        });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(color[0]),
                        g: f64::from(color[1]),
                        b: f64::from(color[2]),
                        a: f64::from(color[3]),
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        if call.output == Output::Surface {
            self.acquire_frame()?;
        }
        // Resolve everything fallible before recording into the encoder.
        let (view, format) = self.output_view(call.output)?;
        let view = view.clone();
        let program = self
            .programs
            .get_mut(&call.program)
            .ok_or(BackendError::UnknownProgram(call.program))?;

        let mut entries = Vec::with_capacity(program.texture_bindings.len() * 2);
        for &binding in &program.texture_bindings {
            let target_id = call
                .textures
                .iter()
                .find(|(slot, _)| slot.binding == binding)
                .map(|(_, id)| *id)
                .ok_or_else(|| BackendError::MissingBinding {
                    program: program.name.to_string(),
                    binding,
                })?;
            let target = self
                .targets
                .get(&target_id)
                .ok_or(BackendError::UnknownTarget(target_id))?;
            let (_, source_view) = target
                .texture
                .as_ref()
                .ok_or(BackendError::IncompleteTarget(target_id))?;
            let sampler = if target.descriptor.filter == FilterMode::Linear
                && self.context.capabilities.linear_filtering
            {
                &self.linear_sampler
            } else {
                &self.nearest_sampler
            };
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(source_view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let field_bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("field bind group"),
                layout: &program.texture_layout,
                entries: &entries,
            });
        let pipeline = program
            .pipeline(&self.context.device, format, call.blend)
            .clone();

        let encoder = self.encoder.get_or_insert_with(|| {
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("fluid encoder"),
                })
        });

        // Copy through a staging buffer so each pass keeps its own uniform values.
        if let Some(uniform_buffer) = program.uniform_buffer.as_ref() {
            let bytes = call.uniforms.as_bytes();
            let staging = self
                .context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("uniform staging"),
                    contents: bytes,
                    usage: wgpu::BufferUsages::COPY_SRC,
                });
            encoder.copy_buffer_to_buffer(&staging, 0, uniform_buffer, 0, bytes.len() as u64);
        }

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.name),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&pipeline);
        render_pass.set_bind_group(0, &program.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &field_bind_group, &[]);
        render_pass.draw(0..3, 0..1);
        Ok(())
    }

    fn read_target(&self, _id: TargetId) -> Result<FieldSnapshot, BackendError> {
        Err(BackendError::Unsupported("GPU readback"))
    }

    fn max_texture_dimension(&self) -> u32 {
        self.context.device.limits().max_texture_dimension_2d
    }

    fn surface_size(&self) -> (u32, u32) {
        self.context.size()
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        self.acquire_frame()
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        if let Some(encoder) = self.encoder.take() {
            self.context.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(frame) = self.frame.take() {
            frame.texture.present();
        }
        Ok(())
    }
}
