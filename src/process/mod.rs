//! The wake processor: drives one wake cycle end to end.
//!
//! On wake the processor checks the supply tier, records the wake
//! reason, asks the registry for a ranking and spawns one bounded
//! worker per ranked action type. Workers are short-lived threads that
//! own their driver for the cycle and observe a shared termination
//! token at every driver boundary. When power degrades or everything
//! finishes, outstanding workers are signalled, joined, and the node
//! goes back to sleep.
//!
//! Shared state lives in [`Node`], one mutex per subsystem. Nested
//! acquisition follows the fixed order codec → registry → queue →
//! stats → journal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

pub use post::{power_on_self_test, PostError};

use crate::action::{ActionId, ActionType, Registry};
use crate::clock::Clock;
use crate::codec::Codec;
use crate::config::{MAX_NUM_SIMULTANEOUS_ACTIONS, ProcessorConfig};
use crate::data::{Backing, DataId, DataQueue};
use crate::driver::{
    BleScanner, Cellular, EnergyTier, EnvironmentSensor, LightSensor, MagneticSensor,
    MotionSensor, PositionSensor, PowerSupervisor, WakeReason, Watchdog,
};
use crate::journal::{Event, EventLog};
use crate::record::{DataFlags, EnergySource, Payload, WakeUp};
use crate::stats::Statistics;

mod post;
mod worker;

pub type SharedCellular = Arc<Mutex<dyn Cellular + Send>>;
pub type SharedEnvironment = Arc<Mutex<dyn EnvironmentSensor + Send>>;
pub type SharedLight = Arc<Mutex<dyn LightSensor + Send>>;
pub type SharedMotion = Arc<Mutex<dyn MotionSensor + Send>>;
pub type SharedPosition = Arc<Mutex<dyn PositionSensor + Send>>;
pub type SharedMagnetic = Arc<Mutex<dyn MagneticSensor + Send>>;
pub type SharedBle = Arc<Mutex<dyn BleScanner + Send>>;

// Locks never stay poisoned: a worker that panicked mid-update is a
// bug, but limping on beats wedging the node.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared core state: one mutex per subsystem, one clock for all.
pub struct Node {
    pub registry: Mutex<Registry>,
    pub queue: Mutex<DataQueue>,
    pub codec: Mutex<Codec>,
    pub stats: Mutex<Statistics>,
    pub journal: Mutex<EventLog>,
    pub clock: Arc<dyn Clock>,
}

impl Node {
    pub fn new(backing: Backing, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry::new(clock.clone())),
            queue: Mutex::new(DataQueue::new(backing, clock.clone())),
            codec: Mutex::new(Codec::new()),
            stats: Mutex::new(Statistics::new()),
            journal: Mutex::new(EventLog::new()),
            clock,
        })
    }

    /// Allocate a data record under both core locks.
    pub fn alloc_data(
        &self,
        action: Option<ActionId>,
        flags: DataFlags,
        payload: &Payload,
    ) -> Option<DataId> {
        let mut registry = lock(&self.registry);
        let mut queue = lock(&self.queue);
        queue.alloc(action, flags, payload, &mut registry)
    }

    /// Finish an action: record its energy cost, mark it completed and
    /// feed the statistics.
    pub fn complete_action(&self, id: ActionId, energy_nwh: u64) {
        let ty = {
            let mut registry = lock(&self.registry);
            registry.set_energy_cost(id, energy_nwh);
            registry.complete(id);
            registry.action_type(id)
        };
        let mut stats = lock(&self.stats);
        if let Some(ty) = ty {
            stats.add_action(ty);
        }
        stats.add_energy(energy_nwh);
    }

    pub fn abort_action(&self, id: ActionId) {
        lock(&self.registry).abort(id);
    }

    /// Jump the system clock to `new_time`, shifting the statistics
    /// stamps first so day accounting stays coherent.
    pub fn set_time(&self, new_time: i64) {
        let old_now = self.clock.now_utc();
        lock(&self.stats).time_update(new_time, old_now);
        self.clock.adjust(new_time - old_now);
    }

    pub(crate) fn log_event(&self, event: Event, parameter: u32) {
        lock(&self.journal).add(&*self.clock, event, parameter);
    }
}

/// Shared termination signal for a cycle's workers.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The external collaborators, one owner each per cycle.
///
/// Sensors are optional; an absent driver simply keeps its action
/// types out of [`Processor::init`]'s seeding.
pub struct Drivers {
    pub power: Arc<dyn PowerSupervisor>,
    pub watchdog: Option<Box<dyn Watchdog>>,
    pub cellular: Option<SharedCellular>,
    pub environment: Option<SharedEnvironment>,
    pub light: Option<SharedLight>,
    pub motion: Option<SharedMotion>,
    pub position: Option<SharedPosition>,
    pub magnetic: Option<SharedMagnetic>,
    pub ble: Option<SharedBle>,
}

impl Drivers {
    fn present(&self, ty: ActionType) -> bool {
        match ty {
            ActionType::Report | ActionType::GetTimeAndReport => self.cellular.is_some(),
            ActionType::MeasureHumidity
            | ActionType::MeasurePressure
            | ActionType::MeasureTemperature => self.environment.is_some(),
            ActionType::MeasureLight => self.light.is_some(),
            ActionType::MeasureOrientation => self.motion.is_some(),
            ActionType::MeasurePosition => self.position.is_some(),
            ActionType::MeasureMagnetic => self.magnetic.is_some(),
            ActionType::MeasureBle => self.ble.is_some(),
        }
    }
}

struct WorkerSlot {
    thread: JoinHandle<()>,
    ty: ActionType,
}

pub struct Processor {
    node: Arc<Node>,
    drivers: Drivers,
    config: ProcessorConfig,
    workers: [Option<WorkerSlot>; MAX_NUM_SIMULTANEOUS_ACTIONS],
    cancel: CancelToken,
}

impl Processor {
    pub fn new(node: Arc<Node>, drivers: Drivers, config: ProcessorConfig) -> Self {
        Self {
            node,
            drivers,
            config,
            workers: Default::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Seed the registry so the first ranking schedules every action
    /// type that has a driver behind it: one completed action per
    /// type, nonzero desirability. Also arms the watchdog.
    pub fn init(&mut self) {
        if let Some(watchdog) = self.drivers.watchdog.as_mut() {
            watchdog.start(crate::config::WATCHDOG_TIMEOUT_SECONDS);
        }
        let mut registry = lock(&self.node.registry);
        let mut queue = lock(&self.node.queue);
        for ty in ActionType::ALL {
            if !self.drivers.present(ty) {
                continue;
            }
            registry.set_desirability(ty, 1);
            if let Some(id) = registry.add(ty, &mut queue) {
                registry.complete(id);
            }
        }
    }

    /// Run the node's power-on self-test over the present drivers.
    pub fn post(&mut self) -> Result<(), PostError> {
        let mut registry = lock(&self.node.registry);
        power_on_self_test(&mut self.drivers, &mut registry, self.config.best_effort_post)
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    fn power_is_good(&self) -> bool {
        self.drivers.power.tier() >= EnergyTier::Bearable
    }

    fn feed_watchdog(&mut self) {
        if let Some(watchdog) = self.drivers.watchdog.as_mut() {
            watchdog.feed();
        }
    }

    // Reap finished workers, returning how many still run.
    fn sweep_workers(&mut self) -> usize {
        let mut running = 0;
        for slot in &mut self.workers {
            match slot.take() {
                Some(w) if w.thread.is_finished() => {
                    if w.thread.join().is_err() {
                        warn!("worker for {:?} panicked", w.ty);
                    }
                }
                Some(w) => {
                    *slot = Some(w);
                    running += 1;
                }
                None => {}
            }
        }
        running
    }

    /// Handle one wake cycle, returning when it is time to sleep.
    ///
    /// Does nothing below the bearable supply tier.
    pub fn handle_wake(&mut self, reason: WakeReason) {
        if !self.power_is_good() {
            debug!("supply tier {:?}, going straight back to sleep", self.drivers.power.tier());
            return;
        }
        self.feed_watchdog();

        let now = self.node.clock.now_utc();
        lock(&self.node.stats).wake_up(now);
        self.node.log_event(Event::WakeUp, reason.as_u8() as u32);
        info!("awake, reason {:?}", reason);

        self.node.alloc_data(
            None,
            DataFlags::SEND_NOW,
            &Payload::WakeUp(WakeUp::new(reason)),
        );
        self.node.alloc_data(
            None,
            DataFlags::empty(),
            &Payload::EnergySource(EnergySource {
                source: self.drivers.power.energy_source(),
            }),
        );

        self.cancel = CancelToken::new();

        // Rank and dispatch while the power holds out.
        let mut next_ty = {
            let mut registry = lock(&self.node.registry);
            let queue = lock(&self.node.queue);
            registry.rank(&queue)
        };
        let mut slot_index = 0;
        while let Some(ty) = next_ty {
            if !self.power_is_good() {
                break;
            }
            if self.workers[slot_index].is_none() {
                self.spawn_worker(slot_index, ty);
                next_ty = lock(&self.node.registry).next();
            }

            slot_index += 1;
            if slot_index >= self.workers.len() {
                slot_index = 0;
                // A full batch is in flight; relax a little.
                self.feed_watchdog();
                let running = self.sweep_workers();
                debug!("{} worker(s) running", running);
                thread::sleep(self.config.idle);
            }
            self.sweep_workers();
        }

        // Everything is dispatched; watch the stragglers while the
        // power stays up.
        while self.power_is_good() && self.sweep_workers() > 0 {
            self.feed_watchdog();
            thread::sleep(self.config.idle);
        }

        // Power gone or work done: signal and collect every worker.
        self.cancel.cancel();
        self.node.log_event(Event::WorkersSignalled, 0);
        for slot in &mut self.workers {
            if let Some(w) = slot.take() {
                if w.thread.join().is_err() {
                    warn!("worker for {:?} panicked", w.ty);
                }
            }
        }
        self.node.log_event(Event::AllWorkersDone, 0);

        let sleep_time = self.node.clock.now_utc();
        lock(&self.node.stats).sleep(sleep_time);
        self.node.log_event(Event::Sleep, 0);
        self.drain_journal();
        info!("wake cycle over, sleeping");
    }

    fn spawn_worker(&mut self, slot_index: usize, ty: ActionType) {
        let Some(driver) = worker::driver_for(&self.drivers, ty) else {
            debug!("no driver for {:?}, skipping", ty);
            return;
        };
        let action = {
            let mut registry = lock(&self.node.registry);
            let mut queue = lock(&self.node.queue);
            registry.add(ty, &mut queue)
        };
        let Some(action) = action else {
            warn!("registry full, cannot run {:?}", ty);
            return;
        };

        let ctx = worker::WorkerCtx {
            node: self.node.clone(),
            cancel: self.cancel.clone(),
            power: self.drivers.power.clone(),
            device_name: self.config.device_name.clone(),
            server_address: self.config.server_address.clone(),
            server_port: self.config.server_port,
            encode_buffer_len: self.config.encode_buffer_len,
        };
        let spawned = thread::Builder::new()
            .name(format!("action-{}", slot_index))
            .stack_size(crate::config::ACTION_THREAD_STACK_SIZE)
            .spawn(move || worker::run(ctx, ty, action, driver));
        match spawned {
            Ok(thread) => {
                self.workers[slot_index] = Some(WorkerSlot { thread, ty });
            }
            Err(e) => {
                warn!("failed to spawn worker for {:?}: {}", ty, e);
                self.node.abort_action(action);
            }
        }
    }

    // Package the cycle's journal into log records while there is
    // room; entries that do not fit stay for the next cycle.
    fn drain_journal(&mut self) {
        loop {
            let mut registry = lock(&self.node.registry);
            let mut queue = lock(&self.node.queue);
            let mut journal = lock(&self.node.journal);
            if journal.is_empty() || !queue.alloc_check(crate::record::DataKind::Log) {
                break;
            }
            let Some(chunk) = journal.drain_chunk() else {
                break;
            };
            queue.alloc(None, DataFlags::empty(), &Payload::Log(chunk), &mut registry);
        }
    }
}
