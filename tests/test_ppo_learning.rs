//! Verify the actor-critic agent learns from synthetic data
//!
//! One state, four actions around zero. Larger actions carry larger
//! advantages, so repeated PPO updates must push the greedy action up.

#![cfg(feature = "training")]

use drive_rl::{
    buffer::Minibatch,
    policy::{
        actor_critic::{ActorCritic, AgentConfig},
        PolicyAgent,
    },
    train::TrainConfig,
};

#[test]
fn test_ppo_moves_mean_toward_advantage() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainConfig::default().learning_rate(3e-3);
    let agent_config = AgentConfig {
        hidden_dim: 32,
        rnd_dim: 8,
        checkpoint_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let mut agent = ActorCritic::new(3, 1, &config, agent_config).unwrap();

    let state = vec![0.5_f32, -0.25, 1.0];
    let batch = Minibatch {
        states: vec![state.clone(); 4],
        actions: vec![vec![-0.2], vec![-0.1], vec![0.1], vec![0.2]],
        extrinsic_returns: vec![0.0; 4],
        intrinsic_returns: vec![0.0; 4],
        extrinsic_advantages: vec![-1.5, -0.5, 0.5, 1.5],
        intrinsic_advantages: vec![0.0; 4],
    };

    let before = agent.predict(&state, true).unwrap().action[0];
    for _ in 0..10 {
        agent.update_old_policy().unwrap();
        for _ in 0..5 {
            let stats = agent.train(&batch).unwrap();
            assert!(stats.total_loss.is_finite());
        }
    }
    let after = agent.predict(&state, true).unwrap().action[0];

    println!("greedy action {:.4} -> {:.4}", before, after);
    assert!(after > before + 0.01, "mean did not move: {} -> {}", before, after);
    assert_eq!(agent.train_step_idx(), 50);
}

#[test]
fn test_rnd_predictor_learns_visited_states() {
    let dir = tempfile::tempdir().unwrap();
    let agent_config = AgentConfig {
        hidden_dim: 32,
        rnd_dim: 8,
        checkpoint_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let mut agent =
        ActorCritic::new(2, 1, &TrainConfig::default().learning_rate(1e-2), agent_config).unwrap();

    let visited = vec![vec![1.0_f32, 0.0]; 8];
    let batch = Minibatch {
        states: visited.clone(),
        actions: vec![vec![0.0]; 8],
        extrinsic_returns: vec![0.0; 8],
        intrinsic_returns: vec![0.0; 8],
        extrinsic_advantages: vec![0.0; 8],
        intrinsic_advantages: vec![0.0; 8],
    };

    let before = agent.intrinsic_reward(&visited[..1]).unwrap()[0];
    agent.update_old_policy().unwrap();
    for _ in 0..100 {
        agent.train(&batch).unwrap();
    }
    let after = agent.intrinsic_reward(&visited[..1]).unwrap()[0];

    assert!(after < before, "novelty of a visited state should shrink: {} -> {}", before, after);
}
