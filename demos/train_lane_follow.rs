//! Train the actor-critic agent on the lane-following simulator
//!
//! ```text
//! cargo run --release --features training --example train_lane_follow -- \
//!     --run-name lane_follow --num-episodes 200
//! ```
//!
//! Exits with status 3 if the simulator is closed mid-run.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use drive_rl::{
    env::{lane_follow::LaneFollow, Environment},
    policy::actor_critic::{ActorCritic, AgentConfig},
    train::{exit_code, train, RestartPolicy, RunOptions, TrainConfig},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Train a PPO lane-following agent")]
struct Cli {
    #[arg(long, help = "JSON file with training hyperparameters")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "lane_follow", help = "Name of the training run")]
    run_name: String,

    #[arg(long, help = "Episode budget (0 = until interrupted)")]
    num_episodes: Option<u64>,

    #[arg(long, help = "Initial learning rate")]
    learning_rate: Option<f64>,

    #[arg(long, help = "Rollout horizon")]
    horizon: Option<usize>,

    #[arg(long, help = "Encoder model name, e.g. bce_cnn_zdim64_beta1_kl_tolerance0.0_data")]
    encoder_model: Option<String>,

    #[arg(long, help = "Shuffle and simulator seed")]
    seed: Option<u64>,

    #[arg(long, default_value_t = 5, help = "Save every N episodes")]
    save_interval: u64,

    #[arg(long, default_value_t = 5, help = "Evaluate every N episodes")]
    eval_interval: u64,

    #[arg(long, help = "Do not record evaluation frames")]
    no_record_eval: bool,

    #[arg(long, value_enum, default_value_t = Restart::Continue, help = "What to do with existing checkpoints")]
    restart: Restart,

    #[arg(long, default_value = "models", help = "Root directory for run artifacts")]
    output_dir: PathBuf,

    #[arg(long, default_value_t = 0.0, help = "Weight of intrinsic advantages")]
    intrinsic_coeff: f64,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Restart {
    Continue,
    Restart,
    Abort,
}

impl From<Restart> for RestartPolicy {
    fn from(restart: Restart) -> Self {
        match restart {
            Restart::Continue => RestartPolicy::Continue,
            Restart::Restart => RestartPolicy::Restart,
            Restart::Abort => RestartPolicy::Abort,
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => TrainConfig::from_json_file(path)?,
        None => TrainConfig::default(),
    };
    if let Some(episodes) = cli.num_episodes {
        config = config.num_episodes(episodes);
    }
    if let Some(lr) = cli.learning_rate {
        config = config.learning_rate(lr);
    }
    if let Some(horizon) = cli.horizon {
        config = config.horizon(horizon);
    }
    if let Some(seed) = cli.seed {
        config = config.seed(seed);
    }
    if let Some(model) = cli.encoder_model {
        config.encoder.model = model;
    }
    config.validate()?;

    let options = RunOptions::new(cli.run_name)
        .save_interval(cli.save_interval)
        .eval_interval(cli.eval_interval)
        .record_eval(!cli.no_record_eval)
        .restart(cli.restart.into())
        .output_dir(cli.output_dir);

    let env = LaneFollow::new(config.encoder.build()?, config.seed);
    let agent_config = AgentConfig {
        intrinsic_coeff: cli.intrinsic_coeff,
        checkpoint_dir: options.run_dir(),
        ..AgentConfig::default()
    };
    let agent = ActorCritic::new(env.state_dim(), env.action_space().dim(), &config, agent_config)?;

    let summary = train(env, agent, &config, &options)?;
    info!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()) {
        error!("{:#}", e);
        std::process::exit(exit_code(&e));
    }
}
