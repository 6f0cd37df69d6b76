use std::borrow::Cow;
use std::collections::HashMap;

use wgpu::naga::ShaderStage;

use crate::compile::LinkedProgram;
use crate::types::BlendMode;

/// Device objects of one linked program plus its pipelines per output.
pub(crate) struct ProgramPipelines {
    pub name: &'static str,
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    pub uniform_buffer: Option<wgpu::Buffer>,
    pub uniform_bind_group: wgpu::BindGroup,
    pub texture_layout: wgpu::BindGroupLayout,
    /// Texture bindings in set 1; each sampler sits one above.
    pub texture_bindings: Vec<u32>,
    pipelines: HashMap<(wgpu::TextureFormat, BlendMode), wgpu::RenderPipeline>,
}

impl ProgramPipelines {
    pub fn new(device: &wgpu::Device, program: &LinkedProgram, filterable: bool) -> Self {
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.name),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(program.vertex.clone()),
                stage: ShaderStage::Vertex,
                defines: &[],
            },
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.name),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(program.fragment.clone()),
                stage: ShaderStage::Fragment,
                defines: &[],
            },
        });

        let uniform_size = u64::from(program.reflection.uniform_size);
        let uniform_entries = if uniform_size > 0 {
            vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }]
        } else {
            Vec::new()
        };
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &uniform_entries,
        });
        let uniform_buffer = (uniform_size > 0).then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("uniform buffer"),
                size: uniform_size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let uniform_group_entries: Vec<wgpu::BindGroupEntry<'_>> = uniform_buffer
            .iter()
            .map(|buffer| wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &uniform_layout,
            entries: &uniform_group_entries,
        });

        let texture_bindings: Vec<u32> = program
            .reflection
            .textures
            .values()
            .map(|slot| slot.binding)
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("field layout"),
            entries: &build_texture_layout_entries(&texture_bindings, filterable),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(program.name),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        Self {
            name: program.name,
            vertex_module,
            fragment_module,
            layout,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            texture_bindings,
            pipelines: HashMap::new(),
        }
    }

    /// Pipeline writing `format` with `blend`, built on first use.
    pub fn pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        blend: BlendMode,
    ) -> &wgpu::RenderPipeline {
        let name = self.name;
        let (vertex_module, fragment_module, layout) =
            (&self.vertex_module, &self.fragment_module, &self.layout);
        self.pipelines.entry((format, blend)).or_insert_with(|| {
            tracing::debug!(program = name, ?format, ?blend, "building pipeline");
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(name),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some("main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: blend_state(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        })
    }
}

pub(crate) fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::Replace => None,
        BlendMode::Premultiplied => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
    }
}

pub(crate) fn build_texture_layout_entries(
    bindings: &[u32],
    filterable: bool,
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let sampler = if filterable {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };
    let mut entries = Vec::with_capacity(bindings.len() * 2);
    for &binding in bindings {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: binding + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler),
            count: None,
        });
    }
    entries
}
