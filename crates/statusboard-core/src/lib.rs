pub mod action;
pub mod adapter;
pub mod batch;
pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod goals;
pub mod item;
pub mod memory;
pub mod notice;
pub mod render;
pub mod session;
pub mod undo;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args);
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting statusboard"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .iter()
        .map(|kv| {
          (
            kv.key.clone(),
            kv.value.clone()
          )
        })
    )
  );
  let settings =
    cfg.settings().context(
      "invalid configuration"
    )?;

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    goals::GoalStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open goal store \
           at {}",
          data_dir.display()
        )
      })?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let command_line = cli.command_line();

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(async move {
    let mut session =
      session::Session::new(
        &settings, store, renderer
      )?;
    match command_line {
      | Some(line) => {
        session.run_once(&line).await
      }
      | None => {
        session.run_interactive().await
      }
    }
  })?;

  info!("done");
  Ok(())
}
