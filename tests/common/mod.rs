//! Scripted environment, agent and recorder shared by the integration tests

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use anyhow::{bail, Result};
use drive_rl::{
    buffer::Minibatch,
    env::{ActionSpace, Environment, Frame, RenderMode, StepInfo, StepResult},
    policy::{PolicyAgent, Prediction},
    record::{FrameRecorder, RecorderFactory},
    train::{EpisodeSummary, StopHandle, TrainingStats},
};

/// Episode of fixed length; closes when the global step counter hits
/// `close_on_step`
#[derive(Debug, Default)]
pub struct ScriptedEnv {
    pub episode_len: usize,
    pub close_on_step: Option<usize>,
    pub t: usize,
    pub steps_total: usize,
    pub resets: usize,
    pub renders: usize,
    pub hud: Vec<String>,
}

impl ScriptedEnv {
    pub fn new(episode_len: usize) -> Self {
        Self { episode_len, ..Self::default() }
    }

    pub fn closing_on(mut self, step: usize) -> Self {
        self.close_on_step = Some(step);
        self
    }
}

impl Environment for ScriptedEnv {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.t = 0;
        self.resets += 1;
        Ok(vec![0.0, 1.0])
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        self.t += 1;
        self.steps_total += 1;
        let closed = self.close_on_step == Some(self.steps_total);
        Ok(StepResult {
            state: vec![self.t as f32, 1.0],
            reward: 1.0 - action[0].abs(),
            terminal: self.t >= self.episode_len,
            info: StepInfo { closed },
        })
    }

    fn render(&mut self, _mode: RenderMode) -> Result<Frame> {
        self.renders += 1;
        let mut frame = Frame::blank(2, 2);
        frame.put(0, 0, [self.t as u8, 0, 0]);
        Ok(frame)
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace { low: vec![-1.0], high: vec![1.0] }
    }

    fn push_hud(&mut self, line: String) {
        self.hud.push(line);
    }
}

/// Panics on any use; proves a code path never touches the environment
pub struct UntouchableEnv;

impl Environment for UntouchableEnv {
    fn reset(&mut self) -> Result<Vec<f32>> {
        panic!("reset called")
    }

    fn step(&mut self, _action: &[f32]) -> Result<StepResult> {
        panic!("step called")
    }

    fn render(&mut self, _mode: RenderMode) -> Result<Frame> {
        panic!("render called")
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace { low: vec![-1.0], high: vec![1.0] }
    }
}

/// Agent call, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Predict { greedy: bool },
    Train { size: usize },
    UpdateOldPolicy,
    IntrinsicReward { states: usize },
    EndEpisode { episode_idx: u64 },
    Save { episode_idx: u64 },
    Load,
    Clear,
}

/// Deterministic agent that records every call
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    pub calls: Vec<Call>,
    pub minibatches: Vec<Minibatch>,
    pub episodes: Vec<EpisodeSummary>,
    pub episode_idx: u64,
    pub train_steps: u64,
    pub checkpoint: Option<u64>,
    pub stop_after: Option<(u64, StopHandle)>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint(episode_idx: u64) -> Self {
        Self { checkpoint: Some(episode_idx), ..Self::default() }
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| matches(c)).count()
    }

    pub fn saves(&self) -> Vec<u64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Save { episode_idx } => Some(*episode_idx),
                _ => None,
            })
            .collect()
    }
}

impl PolicyAgent for ScriptedAgent {
    fn predict(&mut self, state: &[f32], greedy: bool) -> Result<Prediction> {
        self.calls.push(Call::Predict { greedy });
        let action = if greedy { 0.0 } else { 0.5 };
        Ok(Prediction {
            action: vec![action],
            extrinsic_value: 0.1 * state[0],
            intrinsic_value: 0.05,
        })
    }

    fn train(&mut self, batch: &Minibatch) -> Result<TrainingStats> {
        self.calls.push(Call::Train { size: batch.size() });
        self.minibatches.push(batch.clone());
        self.train_steps += 1;
        Ok(TrainingStats::single(0.5, 1.0, 0.1, 0.0, 1.4, 0.0, 0.0))
    }

    fn update_old_policy(&mut self) -> Result<()> {
        self.calls.push(Call::UpdateOldPolicy);
        Ok(())
    }

    fn intrinsic_reward(&mut self, states: &[Vec<f32>]) -> Result<Vec<f32>> {
        self.calls.push(Call::IntrinsicReward { states: states.len() });
        Ok(states.iter().map(|s| 0.1 * (s[0] + 1.0)).collect())
    }

    fn episode_idx(&self) -> u64 {
        self.episode_idx
    }

    fn train_step_idx(&self) -> u64 {
        self.train_steps
    }

    fn end_episode(&mut self, summary: &EpisodeSummary) -> Result<()> {
        self.calls.push(Call::EndEpisode { episode_idx: summary.episode_idx });
        self.episodes.push(summary.clone());
        self.episode_idx = summary.episode_idx + 1;
        if let Some((after, handle)) = &self.stop_after {
            if self.episodes.len() as u64 >= *after {
                handle.request_stop();
            }
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.calls.push(Call::Save { episode_idx: self.episode_idx });
        self.checkpoint = Some(self.episode_idx);
        Ok(())
    }

    fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    fn load_latest_checkpoint(&mut self) -> Result<()> {
        self.calls.push(Call::Load);
        if let Some(episode_idx) = self.checkpoint {
            self.episode_idx = episode_idx;
        }
        Ok(())
    }

    fn clear_checkpoints(&mut self) -> Result<()> {
        self.calls.push(Call::Clear);
        self.checkpoint = None;
        Ok(())
    }
}

/// What the in-memory recorders saw
#[derive(Debug, Default)]
pub struct RecorderLog {
    pub opened: Vec<u64>,
    pub frames: usize,
    pub released: usize,
}

/// Counts frames; refuses writes once `fail_after` frames are stored
pub struct MemoryRecorder {
    log: Rc<RefCell<RecorderLog>>,
    frames: usize,
    fail_after: Option<usize>,
}

impl MemoryRecorder {
    pub fn new(log: Rc<RefCell<RecorderLog>>, fail_after: Option<usize>) -> Self {
        Self { log, frames: 0, fail_after }
    }
}

impl FrameRecorder for MemoryRecorder {
    fn add_frame(&mut self, _frame: &Frame) -> Result<()> {
        if self.fail_after.is_some_and(|limit| self.frames >= limit) {
            bail!("disk full");
        }
        self.frames += 1;
        self.log.borrow_mut().frames += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.log.borrow_mut().released += 1;
        Ok(())
    }

    fn frames(&self) -> usize {
        self.frames
    }
}

pub struct MemoryRecorderFactory {
    pub log: Rc<RefCell<RecorderLog>>,
    pub fail_after: Option<usize>,
}

impl MemoryRecorderFactory {
    pub fn new() -> (Self, Rc<RefCell<RecorderLog>>) {
        let log = Rc::new(RefCell::new(RecorderLog::default()));
        (Self { log: Rc::clone(&log), fail_after: None }, log)
    }

    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl RecorderFactory for MemoryRecorderFactory {
    fn open(&mut self, episode_idx: u64) -> Result<Box<dyn FrameRecorder>> {
        self.log.borrow_mut().opened.push(episode_idx);
        Ok(Box::new(MemoryRecorder::new(Rc::clone(&self.log), self.fail_after)))
    }
}
