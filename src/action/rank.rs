//! Multi-criteria ordering of the live actions.
//!
//! Four stable sort passes run over the working list; because each
//! pass is stable, a later pass dominates the ones before it. The
//! final order of passes is therefore: age (oldest completion first),
//! then energy cost (cheapest first), then desirability (highest
//! first), then variability (largest damped delta first).

use arrayvec::ArrayVec;
use log::debug;

use super::{ActionState, ActionType, Registry, NUM_ACTION_TYPES};
use crate::config::MAX_NUM_ACTIONS;
use crate::data::{DataId, DataQueue};

impl Registry {
    /// Build the ranked action-type list and return its first entry.
    ///
    /// The working list is seeded with every live action, newest slot
    /// first; types whose desirability is zero drop out during the
    /// desirability pass. The result is projected to a deduplicated
    /// type sequence, preserving first occurrence, over which
    /// [`next`][Self::next] then iterates.
    pub fn rank(&mut self, queue: &DataQueue) -> Option<ActionType> {
        self.ranked.clear();
        self.next_rank = 0;

        // Peak damped variability per type. Walked in slot order so
        // that each action's data is diffed against the previous data
        // seen for its type.
        let mut last_data: [Option<DataId>; NUM_ACTION_TYPES] = [None; NUM_ACTION_TYPES];
        let mut peak: [u64; NUM_ACTION_TYPES] = [0; NUM_ACTION_TYPES];
        for slot in &self.slots {
            if matches!(slot.state, ActionState::Null | ActionState::Aborted) {
                continue;
            }
            let Some(data) = slot.data else {
                continue;
            };
            let t = slot.ty.index();
            if let Some(prev) = last_data[t] {
                let delta = queue.difference(prev, data).unsigned_abs() / u64::from(self.damper[t]);
                peak[t] = peak[t].max(delta);
            }
            last_data[t] = Some(data);
        }

        let mut work: ArrayVec<usize, MAX_NUM_ACTIONS> = (0..self.slots.len())
            .rev()
            .filter(|&i| {
                !matches!(
                    self.slots[i].state,
                    ActionState::Null | ActionState::Aborted
                )
            })
            .collect();

        // Most variable first.
        work.sort_by(|&a, &b| {
            let pa = peak[self.slots[a].ty.index()];
            let pb = peak[self.slots[b].ty.index()];
            pb.cmp(&pa)
        });
        // Most desirable first; zero desirability leaves the list.
        work.sort_by(|&a, &b| {
            let da = self.desirability[self.slots[a].ty.index()];
            let db = self.desirability[self.slots[b].ty.index()];
            db.cmp(&da)
        });
        work.retain(|&mut i| self.desirability[self.slots[i].ty.index()] != 0);
        // Cheapest first.
        work.sort_by_key(|&i| self.slots[i].energy_cost_nwh);
        // Oldest completion first; this pass wins all ties above.
        work.sort_by_key(|&i| self.slots[i].time_completed_utc);

        for &i in &work {
            let ty = self.slots[i].ty;
            if !self.ranked.contains(&ty) {
                self.ranked.push(ty);
            }
        }
        debug!("ranked {} action type(s)", self.ranked.len());

        self.next()
    }

    /// Current ranked type, advancing the cursor. `None` past the end.
    pub fn next(&mut self) -> Option<ActionType> {
        let ty = self.ranked.get(self.next_rank).copied();
        if ty.is_some() {
            self.next_rank += 1;
        }
        ty
    }
}
