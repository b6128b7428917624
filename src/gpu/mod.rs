//! GPU execution: compute contexts, the double-buffered submission queue,
//! and the batcher thread that drains it.
//!
//! Emitters whose simulation target is the GPU do not run their scripts on
//! the game thread. Each tick they package a [`ComputeExecutionContext`]
//! (shader sources, the padded parameter blob, instance counts) and push it
//! into a [`GpuDispatchQueue`]. Once per frame the batcher swaps the
//! queue's active/pending buffers and executes every queued context on its
//! own thread: resize buffers, dispatch compute, read the written-count
//! buffer back through a blocking map (expected to rarely block), and hand
//! the count to the game thread via the context's [`CountResult`].
//!
//! By construction the readback lands one frame behind the game-thread
//! tick; the emitter applies it at its next pre-tick. The game thread only
//! blocks on the batcher at teardown, when the thread is joined.

mod dispatch;

pub use dispatch::GpuDispatcher;

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use log::{error, warn};

use crate::error::GpuError;
use crate::param_store::{ParameterStore, StoreBinding};
use crate::script::Script;

/// Slot through which the batcher hands a written-row count back to the
/// emitter that queued the work.
#[derive(Default)]
pub struct CountResult(Mutex<Option<u32>>);

impl CountResult {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a result, replacing any unconsumed one.
    pub fn set(&self, count: u32) {
        *self.0.lock().expect("count result lock") = Some(count);
    }

    /// Take the pending result, if the batcher delivered one.
    pub fn take(&self) -> Option<u32> {
        self.0.lock().expect("count result lock").take()
    }
}

/// One queued GPU simulation dispatch for one emitter tick.
pub struct ComputeExecutionContext {
    /// Emitter the work belongs to; keys the dispatcher's resource cache.
    pub emitter_name: String,
    /// Compiled WGSL for the spawn pass.
    pub spawn_source: String,
    /// Compiled WGSL for the update pass.
    pub update_source: String,
    /// Combined spawn+update parameters in padded constant-buffer layout.
    pub param_blob: Vec<u8>,
    /// Live rows from the previous generation.
    pub prev_num_instances: u32,
    /// Rows to spawn from regular spawn infos.
    pub spawn_rate_instances: u32,
    /// Rows to spawn from event handling.
    pub event_spawn_total: u32,
    /// Total rows the GPU buffers must hold.
    pub capacity: u32,
    /// Stride of one row in 32-bit words.
    pub row_words: u32,
    /// Where the written-count readback is delivered.
    pub result: Arc<CountResult>,
}

struct QueueInner {
    buffers: [Vec<ComputeExecutionContext>; 2],
    write: usize,
}

/// Double-buffered submission queue between game thread and batcher.
///
/// Producers enqueue into the write buffer; [`GpuDispatchQueue::swap_and_drain`]
/// flips the write index and returns everything queued before the flip.
/// Contexts enqueued during a drain land in the next generation.
pub struct GpuDispatchQueue {
    inner: Mutex<QueueInner>,
}

impl GpuDispatchQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner { buffers: [Vec::new(), Vec::new()], write: 0 }),
        })
    }

    /// Queue one context for the next drain.
    pub fn enqueue(&self, ctx: ComputeExecutionContext) {
        let mut inner = self.inner.lock().expect("gpu queue lock");
        let write = inner.write;
        inner.buffers[write].push(ctx);
    }

    /// Flip the generation and return the previously written buffer.
    pub fn swap_and_drain(&self) -> Vec<ComputeExecutionContext> {
        let mut inner = self.inner.lock().expect("gpu queue lock");
        inner.write ^= 1;
        let read = inner.write ^ 1;
        std::mem::take(&mut inner.buffers[read])
    }

    /// Contexts waiting in the write buffer.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock().expect("gpu queue lock");
        inner.buffers[inner.write].len()
    }
}

/// Per-emitter GPU state kept by an [`EmitterInstance`] with a GPU target:
/// the combined parameter store both scripts feed, and the channel the
/// batcher reports written counts through.
pub struct GpuEmitterLink {
    pub queue: Arc<GpuDispatchQueue>,
    pub result: Arc<CountResult>,
    pub combined_params: ParameterStore,
    pub spawn_binding: StoreBinding,
    pub update_binding: StoreBinding,
}

impl GpuEmitterLink {
    /// Build the combined parameter store from both scripts' declarations,
    /// the way the GPU constant buffer expects them: spawn parameters first,
    /// update parameters appended (duplicates collapse).
    pub fn new(queue: Arc<GpuDispatchQueue>, spawn: &Script, update: &Script) -> Self {
        let mut combined = ParameterStore::new();
        for (var, value) in spawn.parameters().iter().chain(update.parameters()) {
            combined.add_parameter(var.clone(), *value);
        }
        combined.lock_layout();
        Self {
            queue,
            result: CountResult::new(),
            combined_params: combined,
            spawn_binding: StoreBinding::default(),
            update_binding: StoreBinding::default(),
        }
    }
}

enum BatcherSignal {
    Drain,
    Shutdown,
}

/// Owns the batcher thread and the queue it drains.
pub struct GpuBatcher {
    queue: Arc<GpuDispatchQueue>,
    signal: Sender<BatcherSignal>,
    join: Option<JoinHandle<()>>,
}

impl GpuBatcher {
    /// Create the GPU device and spin up the batcher thread. Fails when no
    /// compatible adapter exists.
    pub fn new() -> Result<Self, GpuError> {
        let mut dispatcher = pollster::block_on(GpuDispatcher::new())?;
        let queue = GpuDispatchQueue::new();
        let (signal, receiver) = unbounded();
        let thread_queue = queue.clone();
        let join = std::thread::Builder::new()
            .name("scintilla-gpu-batcher".into())
            .spawn(move || {
                while let Ok(signal) = receiver.recv() {
                    match signal {
                        BatcherSignal::Drain => {
                            for ctx in thread_queue.swap_and_drain() {
                                match dispatcher.execute(&ctx) {
                                    Ok(count) => ctx.result.set(count),
                                    Err(e) => {
                                        error!(
                                            "gpu dispatch failed for emitter '{}': {}",
                                            ctx.emitter_name, e
                                        );
                                        ctx.result.set(ctx.prev_num_instances);
                                    }
                                }
                            }
                        }
                        BatcherSignal::Shutdown => break,
                    }
                }
            })
            .map_err(|e| GpuError::Thread(e.to_string()))?;
        Ok(Self { queue, signal, join: Some(join) })
    }

    /// The queue emitters enqueue into.
    pub fn queue(&self) -> Arc<GpuDispatchQueue> {
        self.queue.clone()
    }

    /// Signal the batcher to swap and drain once. Called once per frame
    /// after the game-thread tick.
    pub fn kick_frame(&self) {
        if self.signal.send(BatcherSignal::Drain).is_err() {
            warn!("gpu batcher thread is gone; frame kick dropped");
        }
    }
}

impl Drop for GpuBatcher {
    fn drop(&mut self) {
        // The one deliberate synchronization point with the batcher.
        let _ = self.signal.send(BatcherSignal::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_ctx(tag: &str) -> ComputeExecutionContext {
        ComputeExecutionContext {
            emitter_name: tag.into(),
            spawn_source: String::new(),
            update_source: String::new(),
            param_blob: Vec::new(),
            prev_num_instances: 0,
            spawn_rate_instances: 0,
            event_spawn_total: 0,
            capacity: 0,
            row_words: 4,
            result: CountResult::new(),
        }
    }

    #[test]
    fn test_queue_swap_generations() {
        let queue = GpuDispatchQueue::new();
        queue.enqueue(dummy_ctx("a"));
        queue.enqueue(dummy_ctx("b"));
        assert_eq!(queue.pending(), 2);

        let drained = queue.swap_and_drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.pending(), 0);

        // Work queued after the swap lands in the next generation.
        queue.enqueue(dummy_ctx("c"));
        let drained = queue.swap_and_drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].emitter_name, "c");
        assert!(queue.swap_and_drain().is_empty());
    }

    #[test]
    fn test_count_result_take_consumes() {
        let result = CountResult::new();
        assert_eq!(result.take(), None);
        result.set(42);
        assert_eq!(result.take(), Some(42));
        assert_eq!(result.take(), None);
    }
}
