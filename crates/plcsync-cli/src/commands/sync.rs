//! One-shot controller commands: sync, clear, probe.

use std::fmt::Write as _;
use std::time::Instant;

use serde::Serialize;

use plcsync_core::{SyncOutcome, Synchronizer, Trigger};

use crate::commands::Context;
use crate::commands::util;
use crate::error::CliError;
use crate::output;

// ── Handlers ────────────────────────────────────────────────────────

pub async fn sync(key: &str, ctx: &Context) -> Result<(), CliError> {
    let sync = ctx.synchronizer(key)?;
    let outcome = sync.run(Trigger::Manual).await;
    report(&sync, &outcome, ctx)
}

pub async fn clear(key: &str, ctx: &Context) -> Result<(), CliError> {
    // Fail on an unknown target before prompting.
    let target = ctx.config.target(key)?;
    let name = target.name.as_deref().unwrap_or(key);
    if !util::confirm(
        &format!("Zero every calendar slot on '{name}' ({})?", target.plc_address),
        ctx.global.yes,
    )? {
        return Ok(());
    }

    let sync = ctx.synchronizer(key)?;
    let outcome = sync.clear().await;
    report(&sync, &outcome, ctx)
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    target: &'a str,
    plc_address: &'a str,
    register: String,
    reachable: bool,
    latency_ms: u128,
}

pub async fn probe(key: &str, ctx: &Context) -> Result<(), CliError> {
    let sync = ctx.synchronizer(key)?;
    let config = sync.config();
    let register = config.probe_address()?.to_string();

    let started = Instant::now();
    sync.probe()
        .await
        .map_err(|e| CliError::for_target(key, e))?;
    let elapsed = started.elapsed();

    let report = ProbeReport {
        target: key,
        plc_address: &config.plc_address,
        register,
        reachable: true,
        latency_ms: elapsed.as_millis(),
    };
    let out = output::render_single(
        &ctx.global.output,
        &report,
        |r| {
            format!(
                "{} ({}) answered on {} in {}",
                r.target,
                r.plc_address,
                r.register,
                humantime::format_duration(elapsed)
            )
        },
        |r| r.reachable.to_string(),
    )?;
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

// ── Outcome reporting ───────────────────────────────────────────────

/// Print the outcome of a pass; failures become the command's error.
fn report(sync: &Synchronizer, outcome: &SyncOutcome, ctx: &Context) -> Result<(), CliError> {
    let key = sync.key();
    let out = output::render_single(&ctx.global.output, outcome, detail, |o| {
        match o {
            SyncOutcome::Succeeded { .. } => "succeeded",
            SyncOutcome::Failed { .. } => "failed",
            SyncOutcome::AlreadyRunning => "already_running",
        }
        .to_owned()
    })?;
    output::print_output(&out, ctx.global.quiet);

    match outcome {
        SyncOutcome::Succeeded { .. } => Ok(()),
        SyncOutcome::Failed { errors } => Err(CliError::from_faults(key, errors)),
        SyncOutcome::AlreadyRunning => Err(CliError::SyncInProgress {
            target: key.to_owned(),
        }),
    }
}

fn detail(outcome: &SyncOutcome) -> String {
    let mut out = String::new();
    match outcome {
        SyncOutcome::Succeeded {
            data_version,
            entries,
        } => {
            let _ = writeln!(out, "Sync succeeded (version {data_version})");
            for (kind, count) in entries {
                let _ = writeln!(out, "  {:<8} {count} slot(s) in use", kind.to_string());
            }
        }
        SyncOutcome::Failed { errors } => {
            let _ = writeln!(out, "Sync failed with {} error(s)", errors.len());
            for fault in errors {
                let _ = writeln!(out, "  - {fault}");
            }
        }
        SyncOutcome::AlreadyRunning => {
            let _ = writeln!(out, "A pass is already running");
        }
    }
    out.trim_end().to_owned()
}
