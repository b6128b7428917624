//! wgpu plumbing for the batcher: device ownership, per-emitter GPU
//! resources, compute dispatch and the count readback.
//!
//! Shader contract: spawn and update sources are standalone compute
//! shaders with a `main` entry point and three bindings at group 0:
//! the raw particle word buffer (binding 0, storage), the padded parameter
//! blob (binding 1, uniform), and the written-row counter (binding 2,
//! storage, atomic). The counter starts each frame at zero; the update
//! pass increments it per surviving row, the spawn pass per created row,
//! so after both passes it holds the data set's new live count.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::ComputeExecutionContext;
use crate::error::GpuError;

const WORKGROUP_SIZE: u32 = 64;

struct EmitterResources {
    /// GPU-resident particle words; only ever touched through the bind
    /// group, but owned here so it outlives every dispatch.
    #[allow(dead_code)]
    particle_buffer: wgpu::Buffer,
    particle_bytes: u64,
    param_buffer: wgpu::Buffer,
    param_bytes: u64,
    count_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    spawn_pipeline: wgpu::ComputePipeline,
    spawn_source: String,
    update_pipeline: wgpu::ComputePipeline,
    update_source: String,
}

/// Owns the device and queue plus per-emitter buffers and pipelines,
/// executing queued compute contexts sequentially.
pub struct GpuDispatcher {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    emitters: HashMap<String, EmitterResources>,
}

impl GpuDispatcher {
    /// Acquire a headless device. No surface is involved; the batcher only
    /// does compute.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Simulation Batcher Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceCreation)?;

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Simulation Bind Group Layout"),
                entries: &[
                    // Particle word buffer
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Padded parameter blob
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Written-row counter (atomic)
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Simulation Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Ok(Self { device, queue, bind_group_layout, pipeline_layout, emitters: HashMap::new() })
    }

    /// Run one queued context: resize buffers, upload parameters, dispatch
    /// the update then spawn passes, and read back the written count.
    pub fn execute(&mut self, ctx: &ComputeExecutionContext) -> Result<u32, GpuError> {
        if ctx.spawn_source.is_empty() || ctx.update_source.is_empty() {
            return Err(GpuError::MissingShader(ctx.emitter_name.clone()));
        }

        self.ensure_resources(ctx);
        let res = self.emitters.get(&ctx.emitter_name).expect("resources just ensured");

        // Fresh counter and parameters for this dispatch.
        self.queue.write_buffer(&res.count_buffer, 0, bytemuck::bytes_of(&0u32));
        if !ctx.param_blob.is_empty() {
            self.queue.write_buffer(&res.param_buffer, 0, &ctx.param_blob);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Encoder"),
            });

        let update_instances = ctx.prev_num_instances;
        let spawn_instances = ctx.spawn_rate_instances + ctx.event_spawn_total;
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Simulation Pass"),
                timestamp_writes: None,
            });
            pass.set_bind_group(0, &res.bind_group, &[]);
            if update_instances > 0 {
                pass.set_pipeline(&res.update_pipeline);
                pass.dispatch_workgroups(update_instances.div_ceil(WORKGROUP_SIZE), 1, 1);
            }
            if spawn_instances > 0 {
                pass.set_pipeline(&res.spawn_pipeline);
                pass.dispatch_workgroups(spawn_instances.div_ceil(WORKGROUP_SIZE), 1, 1);
            }
        }
        encoder.copy_buffer_to_buffer(&res.count_buffer, 0, &res.staging_buffer, 0, 4);
        self.queue.submit(Some(encoder.finish()));

        // Synchronous lock on the tiny count buffer; expected to rarely
        // block for long since the submission above is all there is.
        let slice = res.staging_buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        self.device.poll(wgpu::Maintain::Wait);
        let count = {
            let data = slice.get_mapped_range();
            bytemuck::pod_read_unaligned::<u32>(&data[..4])
        };
        res.staging_buffer.unmap();

        Ok(count.min(ctx.capacity))
    }

    fn ensure_resources(&mut self, ctx: &ComputeExecutionContext) {
        let particle_bytes = (ctx.capacity.max(1) as u64) * (ctx.row_words.max(1) as u64) * 4;
        let param_bytes = (ctx.param_blob.len().max(16) as u64 + 15) & !15;

        let needs_rebuild = match self.emitters.get(&ctx.emitter_name) {
            Some(res) => {
                res.particle_bytes < particle_bytes
                    || res.param_bytes < param_bytes
                    || res.spawn_source != ctx.spawn_source
                    || res.update_source != ctx.update_source
            }
            None => true,
        };
        if !needs_rebuild {
            return;
        }

        let particle_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Buffer"),
            size: particle_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let param_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Param Buffer"),
            size: param_bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let count_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Count Buffer"),
            contents: &[0u8; 4],
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Count Staging Buffer"),
            size: 4,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Simulation Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: particle_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: param_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: count_buffer.as_entire_binding() },
            ],
        });

        let spawn_pipeline = self.create_pipeline("Spawn", &ctx.spawn_source);
        let update_pipeline = self.create_pipeline("Update", &ctx.update_source);

        self.emitters.insert(
            ctx.emitter_name.clone(),
            EmitterResources {
                particle_buffer,
                particle_bytes,
                param_buffer,
                param_bytes,
                count_buffer,
                staging_buffer,
                bind_group,
                spawn_pipeline,
                spawn_source: ctx.spawn_source.clone(),
                update_pipeline,
                update_source: ctx.update_source.clone(),
            },
        );
    }

    fn create_pipeline(&self, label: &str, source: &str) -> wgpu::ComputePipeline {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
    }
}
