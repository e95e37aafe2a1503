use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle, ThreadId};

use winit::window::Window;

use crate::coords::Extent;
use crate::error::{EffectError, Result};

use super::current::{self, Current, WorkerState};
use super::surface::{self, Drawable};
use super::ContextConfig;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SHARE_GROUP: AtomicU64 = AtomicU64::new(1);

type Job = Box<dyn FnOnce(&mut Current<'_>) + Send + 'static>;

/// wgpu core objects shared by every context of one share group.
pub(crate) struct DeviceShared {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub share_group: u64,
    pub config: ContextConfig,
}

impl DeviceShared {
    /// Adapter/device acquisition is asynchronous under wgpu.
    async fn request(config: ContextConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| EffectError::resource(format!("no suitable GPU adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("prism device"),
                required_features: config.required_features,
                required_limits: config.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| EffectError::resource(format!("failed to create wgpu device/queue: {e}")))?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            share_group: NEXT_SHARE_GROUP.fetch_add(1, Ordering::Relaxed),
            config,
        })
    }
}

struct ContextInner {
    id: u64,
    shared: Arc<DeviceShared>,
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    worker_thread: ThreadId,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued work and exit.
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if thread::current().id() == self.worker_thread {
            log::warn!("context {} released from its own worker; detaching", self.id);
            return;
        }
        if worker.join().is_err() {
            log::error!("context {} worker panicked", self.id);
        }
        log::debug!("context {} destroyed", self.id);
    }
}

/// Handle to a GPU context bound to its own worker thread.
///
/// All GPU work is submitted with [`run_block`](Self::run_block) and executed
/// in FIFO order on the worker, which makes the context current for the
/// duration of each work item. Handles are cheap to clone; the worker drains
/// its queue and tears down its GPU objects when the last handle drops.
#[derive(Clone)]
pub struct GraphicsContext {
    inner: Arc<ContextInner>,
}

impl GraphicsContext {
    /// Creates a context with its own device (a new share group).
    ///
    /// Fails with [`EffectError::ResourceUnavailable`] when no adapter fits.
    pub fn new(config: ContextConfig) -> Result<Self> {
        let shared = pollster::block_on(DeviceShared::request(config))?;
        Self::spawn(Arc::new(shared))
    }

    /// Creates a context in the same share group as `self`: both use the same
    /// device, so GPU objects created by one are valid on the other.
    pub fn with_shared(&self) -> Result<Self> {
        Self::spawn(self.inner.shared.clone())
    }

    fn spawn(shared: Arc<DeviceShared>) -> Result<Self> {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel::<Job>();

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(format!("prism-context-{id}"))
            .spawn(move || worker_main(id, worker_shared, receiver))
            .map_err(|e| EffectError::resource(format!("failed to spawn context worker: {e}")))?;

        log::debug!("context {id} created in share group {}", shared.share_group);

        Ok(Self {
            inner: Arc::new(ContextInner {
                id,
                worker_thread: worker.thread().id(),
                shared,
                sender: Some(sender),
                worker: Some(worker),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn share_group(&self) -> u64 {
        self.inner.shared.share_group
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.inner.shared.adapter.get_info()
    }

    /// Whether this context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        current::current_context() == Some(self.inner.id)
    }

    fn on_worker(&self) -> bool {
        thread::current().id() == self.inner.worker_thread
    }

    /// Runs `work` on the context's worker with the context current.
    ///
    /// With `wait`, blocks until `work` has completed. Without, returns
    /// immediately; queued work still runs in submission order. Waiting from
    /// the worker itself would deadlock and fails with
    /// [`EffectError::ContextState`].
    pub fn run_block<F>(&self, work: F, wait: bool) -> Result<()>
    where
        F: FnOnce(&mut Current<'_>) + Send + 'static,
    {
        if wait {
            self.run_sync(work)
        } else {
            self.submit(Box::new(work))
        }
    }

    /// Synchronous [`run_block`](Self::run_block) that returns the work's result.
    pub fn run_sync<R, F>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&mut Current<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.on_worker() {
            return Err(EffectError::context_state(
                "synchronous work submitted from the context's own worker",
            ));
        }

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        self.submit(Box::new(move |cx| {
            let _ = done_tx.send(work(cx));
        }))?;

        done_rx
            .recv()
            .map_err(|_| EffectError::context_state("work item did not complete (worker stopped or work panicked)"))
    }

    fn submit(&self, job: Job) -> Result<()> {
        let sender = self
            .inner
            .sender
            .as_ref()
            .ok_or_else(|| EffectError::context_state("context is shutting down"))?;
        sender
            .send(job)
            .map_err(|_| EffectError::context_state("context worker has stopped"))
    }

    /// Creates a presentable drawable for `window` on the calling thread.
    ///
    /// Bind it to the context with
    /// [`Current::renderbuffer_storage`](super::Current::renderbuffer_storage).
    pub fn create_drawable(&self, window: Arc<Window>) -> Result<Drawable> {
        let shared = &self.inner.shared;
        let extent = Extent::from(window.inner_size());

        let surface = shared
            .instance
            .create_surface(window)
            .map_err(|e| EffectError::resource(format!("failed to create wgpu surface: {e}")))?;

        if !shared.adapter.is_surface_supported(&surface) {
            return Err(EffectError::resource("adapter cannot present to this window"));
        }

        let caps = surface.get_capabilities(&shared.adapter);
        let config = surface::surface_config(&caps, extent, &shared.config)?;
        Ok(Drawable::new(surface, config, extent, shared.share_group))
    }
}

fn worker_main(id: u64, shared: Arc<DeviceShared>, receiver: mpsc::Receiver<Job>) {
    let mut state = WorkerState::default();

    while let Ok(job) = receiver.recv() {
        let mut cx = Current::enter(id, &shared, &mut state);
        if panic::catch_unwind(AssertUnwindSafe(|| job(&mut cx))).is_err() {
            log::error!("work item panicked on context {id}");
        }
    }

    log::debug!("context {id} worker exiting");
}
