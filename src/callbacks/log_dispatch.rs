use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::warn;

use crate::{
    dispatch::{Assignment, DispatchArgs},
    model::order::OrderId,
    simulation::callback::SimulationCallback,
};

use super::dump_json;

#[derive(Serialize)]
struct DispatchInputLog<'a> {
    now: NaiveDateTime,
    pending: &'a [OrderId],
}

/// Dumps every auction round as a numbered pair of JSON files, the raw
/// material for offline diagnostics.
pub struct LogDispatchCallback {
    name: String,
    iteration: usize,
}

impl LogDispatchCallback {
    pub fn new(name: String) -> Self {
        Self { name, iteration: 0 }
    }

    fn file(&self, filename: &str) -> PathBuf {
        let mut dir = PathBuf::new();
        dir.push("logs");
        dir.push(&self.name);
        dir.push(format!("{}", self.iteration));
        dir.push(filename);
        dir
    }
}

impl Clone for LogDispatchCallback {
    fn clone(&self) -> Self {
        Self {
            name: format!("{}_cloned", self.name),
            iteration: self.iteration,
        }
    }
}

impl SimulationCallback for LogDispatchCallback {
    fn visit_dispatch_input(&mut self, args: &DispatchArgs<'_>) {
        let log = DispatchInputLog {
            now: args.now,
            pending: args.pending,
        };
        if let Err(err) = dump_json(self.file("dispatch_input.json"), &log) {
            warn!("failed to write dispatch input log: {err:#}");
        }
    }

    fn visit_dispatch_output(&mut self, assignments: &[Assignment]) {
        if let Err(err) = dump_json(self.file("dispatch_output.json"), assignments) {
            warn!("failed to write dispatch output log: {err:#}");
        }
        self.iteration += 1;
    }
}
