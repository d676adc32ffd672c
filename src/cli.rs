//! CLI command handlers

use crate::backbone::{Backbone, TokenTableBackbone};
use crate::config::PretrainConfig;
use crate::data::{MaskingConfig, ShardCorpus};
use crate::distrib::Strategy;
use crate::error::Result;
use crate::optim::{ComposedOptimizer, OptimizerBuilder};
use crate::train::{
    CsvLogger, DualCheckpointCallback, PretrainDriver, ProgressCallback, TrainPlan,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Masked-language-model pretraining controller
#[derive(Parser, Debug)]
#[command(name = "preentrenar")]
#[command(about = "Checkpointed MLM pretraining controller", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run pretraining from a configuration file
    Train {
        /// Configuration file (YAML or JSON)
        config: PathBuf,
        /// Validate the configuration and report the plan without training
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Configuration file (YAML or JSON)
        config: PathBuf,
    },
}

/// Dispatch a parsed command line
pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Train { config, dry_run } => run_train(&config, dry_run),
        Command::Validate { config } => run_validate(&config),
    }
}

fn run_validate(config_path: &Path) -> Result<()> {
    let config = PretrainConfig::load(config_path)?;
    config.validate()?;
    println!("config ok: {}", config_path.display());
    Ok(())
}

fn run_train(config_path: &Path, dry_run: bool) -> Result<()> {
    let config = PretrainConfig::load(config_path)?;
    config.validate()?;

    let plan = TrainPlan::new(
        config.training.num_train_steps,
        config.training.grad_accum_steps,
        config.training.steps_per_epoch,
    )?;

    if dry_run {
        println!("config ok: {}", config_path.display());
        println!("  optimizer: {:?} (lr={})", config.optimizer.variant, config.optimizer.learning_rate);
        println!("  epochs: {}", plan.epochs());
        println!("  batches per epoch: {}", plan.steps_per_epoch);
        println!("  accumulation factor: {}", plan.grad_accum_steps);
        println!("  replicas: {}", config.distribution.replicas);
        return Ok(());
    }

    let strategy =
        Strategy::select(config.distribution.coordinator.as_deref(), config.distribution.replicas)?;

    // Backbone and optimizer construction must happen inside the strategy's
    // execution scope.
    let (backbone, optimizer) = strategy.scope(|| {
        let mut backbone = TokenTableBackbone::new(config.model.vocab_size);
        if let Some(weights) = &config.model.init_weights {
            backbone.load_weights(weights)?;
        }
        let optimizer = build_optimizer(&config)?;
        Ok((backbone, optimizer))
    })?;
    println!("model parameters: {}", backbone.parameter_count());

    let masking = MaskingConfig::new(config.mask_token_id(), config.model.vocab_size as u32)
        .with_mask_prob(config.data.mask_prob);
    let mut corpus = ShardCorpus::load(
        &config.shard_locations()?,
        config.data.sequence_length,
        config.micro_batch_size(),
        masking,
        config.data.seed,
    )?;

    let mut driver = PretrainDriver::new(Box::new(backbone), optimizer);
    driver.set_replicas(strategy.replicas());
    driver.add_callback(ProgressCallback::new(1));
    driver.add_callback(CsvLogger::new(config.training.log_path.clone()));
    let params = driver.params().to_vec();
    driver.add_callback(DualCheckpointCallback::new(
        config.checkpoint.best_path.clone(),
        config.checkpoint.latest_path.clone(),
        params,
    ));

    let summary = driver.fit(&mut corpus, &plan)?;
    println!(
        "done: {} epochs, {} optimizer updates, final loss {:.4}",
        summary.epochs_run, summary.optimizer_steps, summary.final_loss
    );
    Ok(())
}

fn build_optimizer(config: &PretrainConfig) -> Result<ComposedOptimizer> {
    OptimizerBuilder::new(config.optimizer.variant, config.optimizer.learning_rate)
        .with_weight_decay(
            config.optimizer.weight_decay_rate,
            config.optimizer.exclude_from_weight_decay.clone(),
        )
        .with_betas(config.optimizer.beta1, config.optimizer.beta2)
        .with_epsilon(config.optimizer.epsilon)
        .with_bias_correction(config.optimizer.bias_correction)
        .with_schedule(config.schedule_anchors())
        .with_grad_accum_steps(config.training.grad_accum_steps)
        .build()
}
