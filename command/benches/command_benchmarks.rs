use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_command::backend::CommandListType;
use redlilium_command::backend::dummy::DummyCommandList;
use redlilium_command::{
    CommandContext, CommandQueue, CommandQueueDescriptor, ContextConfig, DrawArgs, DummyBackend,
    Resource, ResourceDescriptor, ResourceStateTracker, ResourceStates, Subresource,
};

fn textures(count: usize, mip_levels: u32) -> Vec<Arc<Resource>> {
    (0..count)
        .map(|i| {
            Arc::new(Resource::dummy(
                ResourceDescriptor::texture_2d(512, 512)
                    .with_label(format!("texture_{i}"))
                    .with_mip_levels(mip_levels),
            ))
        })
        .collect()
}

fn context(config: ContextConfig) -> CommandContext<DummyCommandList> {
    CommandContext::new(
        DummyCommandList::new(CommandListType::Direct),
        DummyCommandList::new(CommandListType::Direct),
        config,
    )
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

fn bench_record_transitions(c: &mut Criterion) {
    let resources = textures(256, 1);

    c.bench_function("record_256_resources_3_transitions", |b| {
        b.iter_with_setup(
            || context(ContextConfig::default()),
            |mut recording| {
                for resource in &resources {
                    recording
                        .transition_barrier(resource, ResourceStates::COPY_DEST, Subresource::All)
                        .unwrap();
                    recording
                        .transition_barrier(
                            resource,
                            ResourceStates::PIXEL_SHADER_RESOURCE,
                            Subresource::All,
                        )
                        .unwrap();
                    recording
                        .transition_barrier(
                            resource,
                            ResourceStates::RENDER_TARGET,
                            Subresource::All,
                        )
                        .unwrap();
                }
                recording.flush_resource_barriers().unwrap();
                black_box(recording);
            },
        );
    });
}

fn bench_record_subresources(c: &mut Criterion) {
    let resources = textures(32, 12);

    c.bench_function("record_32_resources_12_mips_expand", |b| {
        b.iter_with_setup(
            || context(ContextConfig::new().with_max_staged_barriers(0)),
            |mut recording| {
                for resource in &resources {
                    recording
                        .transition_barrier(resource, ResourceStates::RENDER_TARGET, Subresource::All)
                        .unwrap();
                    for mip in 0..12u32 {
                        recording
                            .transition_barrier(resource, ResourceStates::COPY_SOURCE, mip)
                            .unwrap();
                    }
                    recording
                        .transition_barrier(
                            resource,
                            ResourceStates::PIXEL_SHADER_RESOURCE,
                            Subresource::All,
                        )
                        .unwrap();
                }
                black_box(recording.flush_resource_barriers().unwrap());
            },
        );
    });
}

// ---------------------------------------------------------------------------
// Close-time resolution
// ---------------------------------------------------------------------------

fn bench_close_against_large_tracker(c: &mut Criterion) {
    let resources = textures(4096, 1);
    let mut global = ResourceStateTracker::new();
    for resource in &resources {
        global.add_resource_state(&**resource, ResourceStates::PIXEL_SHADER_RESOURCE);
    }

    c.bench_function("close_512_pending_against_4096_tracked", |b| {
        b.iter_with_setup(
            || {
                let mut recording = context(ContextConfig::default());
                for resource in resources.iter().step_by(8) {
                    recording
                        .transition_barrier(resource, ResourceStates::RENDER_TARGET, Subresource::All)
                        .unwrap();
                }
                (recording, global.clone())
            },
            |(mut recording, mut global)| {
                black_box(recording.close(&mut global).unwrap());
            },
        );
    });
}

fn bench_queue_frame(c: &mut Criterion) {
    let resources = textures(64, 1);

    c.bench_function("queue_frame_64_render_targets", |b| {
        b.iter_with_setup(
            || {
                CommandQueue::new(
                    Arc::new(DummyBackend::new()),
                    CommandQueueDescriptor::new().with_label("bench"),
                )
            },
            |queue| {
                let mut recording = queue.get_command_context().unwrap();
                for resource in &resources {
                    recording
                        .transition_barrier(resource, ResourceStates::RENDER_TARGET, Subresource::All)
                        .unwrap();
                    recording.draw(DrawArgs::vertices(3)).unwrap();
                    recording
                        .transition_barrier(
                            resource,
                            ResourceStates::PIXEL_SHADER_RESOURCE,
                            Subresource::All,
                        )
                        .unwrap();
                }
                black_box(queue.execute_command_context(recording).unwrap());
                queue
            },
        );
    });
}

criterion_group!(
    benches,
    bench_record_transitions,
    bench_record_subresources,
    bench_close_against_large_tracker,
    bench_queue_frame,
);
criterion_main!(benches);
