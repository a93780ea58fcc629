use chrono::NaiveDateTime;
use dyn_clone::DynClone;

use crate::{
    dispatch::{Assignment, DispatchArgs},
    model::order::Order,
};

/// Observer hooks on the tick loop. Implementations must be cloneable so
/// a simulator (and its callbacks) can be duplicated for comparison runs.
pub trait SimulationCallback: DynClone {
    fn visit_tick(&mut self, _now: &NaiveDateTime) {}
    fn visit_dispatch_input(&mut self, _args: &DispatchArgs<'_>) {}
    fn visit_dispatch_output(&mut self, _assignments: &[Assignment]) {}
    fn visit_delivery(&mut self, _order: &Order) {}
}

dyn_clone::clone_trait_object!(SimulationCallback);
