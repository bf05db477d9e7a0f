//! The action registry: a fixed pool of action slots plus the
//! desirability and variability tables that drive the ranker.
//!
//! Slots are recycled aggressively; handles are generational so that a
//! handle to a recycled slot goes stale instead of aliasing the new
//! occupant. Operations that touch both an action and its data take
//! `&mut DataQueue`, which also fixes the lock order for callers:
//! registry before queue.

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::clock::Clock;
use crate::config::MAX_NUM_ACTIONS;
use crate::data::{DataId, DataQueue};
use crate::record::DataKind;

mod rank;

/// Things the node can decide to do in a wake cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionType {
    Report,
    GetTimeAndReport,
    MeasureHumidity,
    MeasurePressure,
    MeasureTemperature,
    MeasureLight,
    MeasureOrientation,
    MeasurePosition,
    MeasureMagnetic,
    MeasureBle,
}

pub const NUM_ACTION_TYPES: usize = 10;

impl ActionType {
    pub const ALL: [Self; NUM_ACTION_TYPES] = [
        Self::Report,
        Self::GetTimeAndReport,
        Self::MeasureHumidity,
        Self::MeasurePressure,
        Self::MeasureTemperature,
        Self::MeasureLight,
        Self::MeasureOrientation,
        Self::MeasurePosition,
        Self::MeasureMagnetic,
        Self::MeasureBle,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Report => 0,
            Self::GetTimeAndReport => 1,
            Self::MeasureHumidity => 2,
            Self::MeasurePressure => 3,
            Self::MeasureTemperature => 4,
            Self::MeasureLight => 5,
            Self::MeasureOrientation => 6,
            Self::MeasurePosition => 7,
            Self::MeasureMagnetic => 8,
            Self::MeasureBle => 9,
        }
    }

    /// The data kind a successful run of this action produces. The
    /// reporting actions produce none themselves.
    pub fn data_kind(self) -> Option<DataKind> {
        match self {
            Self::Report | Self::GetTimeAndReport => None,
            Self::MeasureHumidity => Some(DataKind::Humidity),
            Self::MeasurePressure => Some(DataKind::Pressure),
            Self::MeasureTemperature => Some(DataKind::Temperature),
            Self::MeasureLight => Some(DataKind::Light),
            Self::MeasureOrientation => Some(DataKind::Acceleration),
            Self::MeasurePosition => Some(DataKind::Position),
            Self::MeasureMagnetic => Some(DataKind::Magnetic),
            Self::MeasureBle => Some(DataKind::Ble),
        }
    }

    /// Slot in the per-day action counters, measurements only.
    pub(crate) fn measurement_index(self) -> Option<usize> {
        match self {
            Self::Report | Self::GetTimeAndReport => None,
            other => Some(other.index() - 2),
        }
    }
}

/// Lifecycle of one registry slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ActionState {
    #[default]
    Null,
    Requested,
    InProgress,
    Completed,
    Aborted,
}

/// Handle to a registry slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ActionId {
    idx: u8,
    gen: u16,
}

impl ActionId {
    pub(crate) fn from_parts(idx: u8, gen: u16) -> Self {
        Self { idx, gen }
    }

    pub(crate) fn index(self) -> u8 {
        self.idx
    }

    pub(crate) fn generation(self) -> u16 {
        self.gen
    }
}

pub const DESIRABILITY_DEFAULT: i8 = 0;
pub const VARIABILITY_DAMPER_DEFAULT: u32 = 1;

#[derive(Clone, Copy, Debug)]
struct Slot {
    ty: ActionType,
    state: ActionState,
    time_completed_utc: i64,
    energy_cost_nwh: u64,
    data: Option<DataId>,
    gen: u16,
}

const EMPTY_SLOT: Slot = Slot {
    ty: ActionType::Report,
    state: ActionState::Null,
    time_completed_utc: 0,
    energy_cost_nwh: 0,
    data: None,
    gen: 0,
};

pub struct Registry {
    slots: [Slot; MAX_NUM_ACTIONS],
    desirability: [i8; NUM_ACTION_TYPES],
    damper: [u32; NUM_ACTION_TYPES],
    ranked: ArrayVec<ActionType, NUM_ACTION_TYPES>,
    next_rank: usize,
    clock: Arc<dyn Clock>,
}

impl Registry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: [EMPTY_SLOT; MAX_NUM_ACTIONS],
            desirability: [DESIRABILITY_DEFAULT; NUM_ACTION_TYPES],
            damper: [VARIABILITY_DAMPER_DEFAULT; NUM_ACTION_TYPES],
            ranked: ArrayVec::new(),
            next_rank: 0,
            clock,
        }
    }

    /// Clear every slot, freeing any data still attached, and put the
    /// desirability and damper tables back to their defaults.
    /// Idempotent.
    pub fn init(&mut self, queue: &mut DataQueue) {
        for i in 0..self.slots.len() {
            if let Some(data) = self.slots[i].data {
                queue.free(data, self);
            }
            let gen = self.slots[i].gen;
            self.slots[i] = Slot {
                gen,
                ..EMPTY_SLOT
            };
        }
        self.desirability = [DESIRABILITY_DEFAULT; NUM_ACTION_TYPES];
        self.damper = [VARIABILITY_DAMPER_DEFAULT; NUM_ACTION_TYPES];
        self.ranked.clear();
        self.next_rank = 0;
    }

    /// Claim a slot for a fresh action in the requested state.
    ///
    /// Null and aborted slots are reused first, then completed ones.
    /// Data attached to a recycled slot is unhooked, not freed: data
    /// outlives its action. Returns `None` when every slot holds a
    /// requested or in-progress action.
    pub fn add(&mut self, ty: ActionType, queue: &mut DataQueue) -> Option<ActionId> {
        let reusable = |wanted: &[ActionState]| {
            self.slots
                .iter()
                .position(|s| wanted.contains(&s.state))
        };
        let idx = reusable(&[ActionState::Null, ActionState::Aborted])
            .or_else(|| reusable(&[ActionState::Completed]))?;

        let slot = &mut self.slots[idx];
        if let Some(data) = slot.data.take() {
            queue.detach_action(data);
        }
        slot.ty = ty;
        slot.state = ActionState::Requested;
        slot.time_completed_utc = 0;
        slot.energy_cost_nwh = 0;
        slot.gen = slot.gen.wrapping_add(1);

        Some(ActionId {
            idx: idx as u8,
            gen: slot.gen,
        })
    }

    /// Move a requested action into progress.
    pub fn start(&mut self, id: ActionId) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.state = ActionState::InProgress;
                true
            }
            None => false,
        }
    }

    /// Mark the action completed, stamping the completion time. Set
    /// the energy cost first; it survives completion.
    pub fn complete(&mut self, id: ActionId) {
        let now = self.clock.now_utc();
        if let Some(slot) = self.slot_mut(id) {
            slot.state = ActionState::Completed;
            slot.time_completed_utc = now;
        }
    }

    pub fn abort(&mut self, id: ActionId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.state = ActionState::Aborted;
        }
    }

    /// Return the slot to the pool. Attached data is left alone; it
    /// has a life of its own in the queue.
    pub fn remove(&mut self, id: ActionId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.state = ActionState::Null;
        }
    }

    pub fn set_energy_cost(&mut self, id: ActionId, nwh: u64) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.energy_cost_nwh = nwh;
                true
            }
            None => false,
        }
    }

    pub fn energy_cost_nwh(&self, id: ActionId) -> Option<u64> {
        Some(self.slot(id)?.energy_cost_nwh)
    }

    pub fn state(&self, id: ActionId) -> Option<ActionState> {
        Some(self.slot(id)?.state)
    }

    pub fn action_type(&self, id: ActionId) -> Option<ActionType> {
        Some(self.slot(id)?.ty)
    }

    pub fn time_completed_utc(&self, id: ActionId) -> Option<i64> {
        Some(self.slot(id)?.time_completed_utc)
    }

    /// How much the node wants actions of this type. Zero (the
    /// default) keeps the type out of the ranking entirely.
    pub fn set_desirability(&mut self, ty: ActionType, desirability: i8) {
        self.desirability[ty.index()] = desirability;
    }

    pub fn desirability(&self, ty: ActionType) -> i8 {
        self.desirability[ty.index()]
    }

    /// Divisor applied to measured deltas of this type before they
    /// enter the variability ranking. Zero is rejected.
    pub fn set_variability_damper(&mut self, ty: ActionType, damper: u32) -> bool {
        if damper == 0 {
            return false;
        }
        self.damper[ty.index()] = damper;
        true
    }

    /// Live actions, i.e. slots that would take part in a ranking.
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s.state, ActionState::Null | ActionState::Aborted))
            .count()
    }

    pub fn count_in_state(&self, state: ActionState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    pub(crate) fn data_of(&self, id: ActionId) -> Option<DataId> {
        self.slot(id)?.data
    }

    pub(crate) fn attach_data(&mut self, id: ActionId, data: DataId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.data = Some(data);
        }
    }

    /// Drop the back-reference from slot `idx` if its generation still
    /// matches; called by the queue when it frees a record.
    pub(crate) fn clear_data(&mut self, idx: u8, gen: u16) {
        if let Some(slot) = self.slots.get_mut(idx as usize) {
            if slot.gen == gen {
                slot.data = None;
            }
        }
    }

    fn slot(&self, id: ActionId) -> Option<&Slot> {
        let slot = self.slots.get(id.idx as usize)?;
        (slot.gen == id.gen && slot.state != ActionState::Null).then_some(slot)
    }

    fn slot_mut(&mut self, id: ActionId) -> Option<&mut Slot> {
        let slot = self.slots.get_mut(id.idx as usize)?;
        (slot.gen == id.gen && slot.state != ActionState::Null).then_some(slot)
    }
}
