//! Deterministic evaluation rollouts

use anyhow::Result;
use tracing::warn;

use super::{error::TrainError, scheduler::Phase, stats::EvalSummary};
use crate::{
    env::{Environment, Frame, RenderMode},
    policy::PolicyAgent,
    record::RecordingSession,
};

/// Run one greedy episode from a fresh reset
///
/// Every rendered frame, including the one after reset, goes to `recording`
/// when present. The session is released on every exit path. A recorder
/// that fails is dropped with a warning and the episode continues
/// unrecorded.
///
/// # Errors
///
/// Returns [`TrainError::EnvironmentClosed`] when a step reports the
/// environment closed.
pub fn evaluate<E, A>(
    env: &mut E,
    agent: &mut A,
    episode_idx: u64,
    mut recording: Option<RecordingSession>,
) -> Result<EvalSummary>
where
    E: Environment + ?Sized,
    A: PolicyAgent + ?Sized,
{
    let mut state = env.reset()?;
    if recording.is_some() {
        let frame = env.render(RenderMode::RgbArray)?;
        record_frame(&mut recording, &frame);
    }

    let mut total_reward = 0.0;
    let mut steps = 0;
    loop {
        env.push_hud(format!("Episode {}", episode_idx));
        env.push_hud("Running eval...".to_string());
        env.push_hud(String::new());

        let prediction = agent.predict(&state, true)?;
        let step = env.step(&prediction.action)?;
        if step.info.closed {
            return Err(TrainError::EnvironmentClosed { phase: Phase::Evaluating }.into());
        }

        let frame = env.render(RenderMode::RgbArray)?;
        record_frame(&mut recording, &frame);

        total_reward += f64::from(step.reward);
        steps += 1;
        state = step.state;
        if step.terminal {
            break;
        }
    }

    let frames_recorded = match recording.map(RecordingSession::finish) {
        Some(Ok(frames)) => frames,
        Some(Err(e)) => {
            warn!("Failed to finish recording of episode {}: {:#}", episode_idx, e);
            0
        }
        None => 0,
    };

    Ok(EvalSummary { episode_idx, total_reward, steps, frames_recorded })
}

/// Append `frame`, abandoning the recording on the first write error
fn record_frame(recording: &mut Option<RecordingSession>, frame: &Frame) {
    if let Some(session) = recording.as_mut() {
        if let Err(e) = session.add_frame(frame) {
            warn!("Recording failed, continuing unrecorded: {:#}", e);
            *recording = None;
        }
    }
}
