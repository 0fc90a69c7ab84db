//! Process context.
//!
//! [`Hat`] owns every piece of shared state: the deferred queue, the vector
//! dispatcher, the channel group, and the bus target. Interrupt entry points
//! and the run loop all go through one `&'static Hat`, typically placed in a
//! `static` cell by the binary before interrupts are unmasked:
//!
//! ```text
//!  IRQ ──▶ on_interrupt ──▶ Dispatcher ──▶ isr(source) ──▶ post Work
//!                                                              │
//!  run ◀── act(work) ◀── DeferredQueue ◀───────────────────────┘
//! ```

use crate::{
    bus::ControlBus,
    clock::{CaptureTimer, ChannelGroup, PinInterrupts},
    config::{CHANNELS, HatConfig, SOURCES, Source, WORK_SLOTS, Work},
    deferred::{DeferredQueue, Schedule, WorkId},
    error::DispatchError,
    target::{TargetPort, TargetRouter},
    vector::{Dispatcher, SourceId, Vector, VectorControl},
};

/// Size of the vector table covered by the dispatcher.
pub const VECTORS: usize = 32;

/// The HAT firmware state.
pub struct Hat<V, T, P, Port> {
    config: HatConfig,
    queue: DeferredQueue<WORK_SLOTS>,
    dispatcher: Dispatcher<VECTORS, SOURCES, V>,
    group: ChannelGroup<T, P>,
    router: TargetRouter,
    port: Port,
}

impl<V, T, P, Port> Hat<V, T, P, Port>
where
    V: VectorControl,
    T: CaptureTimer,
    P: PinInterrupts,
    Port: TargetPort,
{
    pub fn new(config: HatConfig, vectors: V, timer: T, pins: P, port: Port) -> Self {
        Self {
            config,
            queue: DeferredQueue::new(),
            dispatcher: Dispatcher::new(vectors),
            group: ChannelGroup::new(&config, timer, pins),
            router: TargetRouter::new(),
            port,
        }
    }

    /// Registers all interrupt sources, arms the pin lines, queues the initial
    /// push of every channel, and enables the bus target.
    ///
    /// Call once, from thread mode.
    pub fn start(&self) -> Result<(), DispatchError> {
        self.dispatcher
            .register(self.config.target_vector, Source::Target.id())?;
        for (ch, line) in self.config.blocks.iter().enumerate() {
            self.dispatcher
                .register(line.vector, Source::Block(ch as u8).id())?;
        }
        self.dispatcher
            .register(self.config.reference.vector, Source::Reference.id())?;

        self.group.arm();
        for proxy in self.group.proxies() {
            self.queue.enqueue(proxy.sync_work());
        }
        self.port.set_notifications(true);

        info!("hat: started, base address {=u8:#x}", self.config.base_address);
        Ok(())
    }

    /// Entry point for every vector the HAT registered.
    pub fn on_interrupt(&self) {
        self.dispatcher.trampoline(|source| self.isr(source));
    }

    /// Dispatches `vector` explicitly, for vector tables with one handler per
    /// vector.
    pub fn dispatch(&self, vector: Vector) -> Result<usize, DispatchError> {
        self.dispatcher.dispatch(vector, |source| self.isr(source))
    }

    /// Interrupt handler of one source.
    pub fn isr(&self, source: SourceId) {
        match Source::from_id(source) {
            Some(Source::Target) => {
                let proxies = self.group.proxies();
                self.port
                    .service(&mut |event| self.router.handle(event, proxies, &self.queue));
            }
            Some(Source::Block(ch)) => {
                self.group.on_block_boundary(ch, &self.queue);
            }
            Some(Source::Reference) => self.group.on_reference(&self.queue),
            None => {}
        }
    }

    /// Completion hook of an asynchronous control bus; interrupt context.
    ///
    /// Re-posts the reconciliation of `channel` if it has host writes left,
    /// so a push that failed with [`BusError::Busy`](crate::error::BusError)
    /// goes out now rather than with the next block. Returns whether work was
    /// posted.
    pub fn on_transfer_complete(&self, channel: u8) -> bool {
        let Some(proxy) = self.group.proxy(channel) else {
            return false;
        };
        if !proxy.with_shadow(|s| s.any_dirty()) {
            return false;
        }
        self.queue.schedule(proxy.sync_work());
        true
    }

    /// Runs one deferred action. `buses[n]` reaches the chip of channel `n`.
    ///
    /// Bus errors are logged where they happen; whatever was not pushed stays
    /// dirty and goes out with the channel's next block.
    pub fn act<B: ControlBus>(&self, work: WorkId, buses: &mut [B; CHANNELS]) {
        match Work::from_id(work) {
            Some(Work::Sync(ch)) => {
                let proxy = self.group.proxy(ch);
                if let (Some(proxy), Some(bus)) = (proxy, buses.get_mut(ch as usize)) {
                    let _ = proxy.push_dirty(bus);
                }
            }
            Some(Work::RxBlock(ch)) => {
                if let Some(bus) = buses.get_mut(ch as usize) {
                    let _ = self.group.refresh_rx(ch, bus);
                }
            }
            Some(Work::TxBlock) => {
                let _ = self.group.refresh_tx(buses);
            }
            None => {}
        }
    }

    /// Drains the deferred queue once; returns the number of actions run.
    pub fn poll<B: ControlBus>(&self, buses: &mut [B; CHANNELS]) -> usize {
        self.queue.drain_all(|work| self.act(work, buses))
    }

    /// The run loop. `wait` sleeps until the next interrupt.
    pub fn run<B: ControlBus>(&self, buses: &mut [B; CHANNELS], wait: impl FnMut()) -> ! {
        self.queue.run_forever(|work| self.act(work, buses), wait)
    }

    pub fn config(&self) -> &HatConfig {
        &self.config
    }

    pub fn queue(&self) -> &DeferredQueue<WORK_SLOTS> {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Dispatcher<VECTORS, SOURCES, V> {
        &self.dispatcher
    }

    pub fn group(&self) -> &ChannelGroup<T, P> {
        &self.group
    }

    pub fn router(&self) -> &TargetRouter {
        &self.router
    }

    pub fn port(&self) -> &Port {
        &self.port
    }
}

impl<V, T, P, Port> core::fmt::Debug for Hat<V, T, P, Port> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hat")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}
