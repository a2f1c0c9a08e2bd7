use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use instant::Instant;

use crate::collaborators::{FrameStage, FrameStats};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTotals {
    pub total: Duration,
    pub samples: u64,
}

impl StageTotals {
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples as u32
        }
    }
}

/// Wall-clock accumulator for frame stages.
#[derive(Debug, Default)]
pub struct StageTimer {
    running: BTreeMap<FrameStage, Instant>,
    totals: BTreeMap<FrameStage, StageTotals>,
}

impl StageTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self, stage: FrameStage) -> StageTotals {
        self.totals.get(&stage).copied().unwrap_or_default()
    }

    pub fn report(&self) -> String {
        FrameStage::ALL
            .iter()
            .map(|stage| {
                let t = self.totals(*stage);
                format!("{:?}: {:?} avg over {}", stage, t.average(), t.samples)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FrameStats for StageTimer {
    fn start_clock(&mut self, stage: FrameStage) {
        self.running.insert(stage, Instant::now());
    }

    fn stop(&mut self, stage: FrameStage) {
        let Some(started) = self.running.remove(&stage) else {
            tracing::warn!("Stage {:?} stopped without being started", stage);
            return;
        };
        let entry = self.totals.entry(stage).or_default();
        entry.total += started.elapsed();
        entry.samples += 1;
    }
}

/// Lets the owner keep reading a timer it handed to the engine.
impl<T: FrameStats> FrameStats for Rc<RefCell<T>> {
    fn start_clock(&mut self, stage: FrameStage) {
        self.borrow_mut().start_clock(stage);
    }

    fn stop(&mut self, stage: FrameStage) {
        self.borrow_mut().stop(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_accumulate_samples() {
        let mut timer = StageTimer::new();
        for _ in 0..3 {
            timer.start_clock(FrameStage::Physics);
            timer.stop(FrameStage::Physics);
        }
        assert_eq!(timer.totals(FrameStage::Physics).samples, 3);
        assert_eq!(timer.totals(FrameStage::Sound).samples, 0);
    }

    #[test]
    fn unmatched_stop_is_ignored() {
        let mut timer = StageTimer::new();
        timer.stop(FrameStage::Dbvt);
        assert_eq!(timer.totals(FrameStage::Dbvt).samples, 0);
        assert!(timer.report().contains("Dbvt"));
    }
}
