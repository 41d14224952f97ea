//! Weighted progress reporting.
//!
//! A `Progress` is split into named steps with relative weights. Work inside
//! the current step is reported as a fraction, or delegated to a child
//! `Progress` that covers exactly the current step. Every update is mapped
//! onto one overall percentage, which only ever increases.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use crate::events::{CcgxEvent, CcgxObserver};

#[derive(Debug, Clone)]
struct Step {
    name: &'static str,
    weight: u32,
}

pub struct Progress {
    observer: Arc<dyn CcgxObserver>,
    steps: Vec<Step>,
    current: usize,
    /// Overall percentage range covered by this progress.
    start: f64,
    end: f64,
    /// Step name reported when no own step is named.
    label: &'static str,
    last: Rc<Cell<u8>>,
}

impl Progress {
    pub fn new(observer: Arc<dyn CcgxObserver>) -> Self {
        Self {
            observer,
            steps: Vec::new(),
            current: 0,
            start: 0.0,
            end: 100.0,
            label: "",
            last: Rc::new(Cell::new(0)),
        }
    }

    pub fn add_step(&mut self, name: &'static str, weight: u32) {
        self.steps.push(Step { name, weight });
    }

    /// Mark the current step finished.
    pub fn step_done(&mut self) {
        if self.current < self.steps.len() {
            self.current += 1;
        }
        let (_, end) = self.step_span(self.current.saturating_sub(1));
        self.emit(end);
    }

    /// Report `done` of `total` units within the current step.
    pub fn set_fraction(&mut self, done: usize, total: usize) {
        let (start, end) = self.step_span(self.current);
        let fraction = if total == 0 {
            1.0
        } else {
            done.min(total) as f64 / total as f64
        };
        self.emit(start + (end - start) * fraction);
    }

    /// Progress covering exactly the current step.
    pub fn child(&self) -> Progress {
        let (start, end) = self.step_span(self.current);
        Progress {
            observer: Arc::clone(&self.observer),
            steps: Vec::new(),
            current: 0,
            start,
            end,
            label: self.current_name(),
            last: Rc::clone(&self.last),
        }
    }

    /// Highest overall percentage reported so far.
    pub fn percentage(&self) -> u8 {
        self.last.get()
    }

    /// Name of the step in progress.
    pub fn current_name(&self) -> &'static str {
        self.steps
            .get(self.current)
            .map(|s| s.name)
            .unwrap_or(self.label)
    }

    fn step_span(&self, idx: usize) -> (f64, f64) {
        let total: u32 = self.steps.iter().map(|s| s.weight).sum();
        if self.steps.is_empty() || total == 0 {
            return (self.start, self.end);
        }
        let idx = idx.min(self.steps.len() - 1);
        let before: u32 = self.steps[..idx].iter().map(|s| s.weight).sum();
        let scale = (self.end - self.start) / total as f64;
        let start = self.start + before as f64 * scale;
        (start, start + self.steps[idx].weight as f64 * scale)
    }

    fn emit(&self, overall: f64) {
        let pct = overall.clamp(0.0, 100.0).round() as u8;
        if pct <= self.last.get() {
            return;
        }
        self.last.set(pct);
        self.observer.on_event(&CcgxEvent::Progress {
            step: self.current_name().to_string(),
            percentage: pct,
        });
    }
}
