//! Status and target listing. Read from the status files; no controller
//! traffic and no credentials needed.

use std::fmt::Write as _;

use chrono::Local;
use serde::Serialize;
use tabled::Tabled;

use plcsync_config::Target;
use plcsync_core::{StatusReport, SyncPhase, SyncStatus};

use crate::commands::Context;
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Target")]
    key: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Version")]
    version: u64,
    #[tabled(rename = "Last success")]
    last_success: String,
    #[tabled(rename = "Next")]
    next: String,
    #[tabled(rename = "Controller")]
    controller: String,
    #[tabled(rename = "Errors")]
    errors: usize,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "PLC")]
    plc: String,
    #[tabled(rename = "Banks")]
    banks: String,
    #[tabled(rename = "Locations")]
    locations: String,
}

#[derive(Serialize)]
struct TargetSummary {
    key: String,
    #[serde(flatten)]
    target: Target,
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn status(key: Option<&str>, ctx: &Context) -> Result<(), CliError> {
    let keys: Vec<String> = match key {
        Some(key) => {
            ctx.config.target(key)?;
            vec![key.to_owned()]
        }
        None => ctx.config.targets().into_keys().collect(),
    };

    let reports = keys
        .iter()
        .map(|key| load_report(key, ctx))
        .collect::<Result<Vec<_>, _>>()?;

    let color = ctx.color();
    let out = match (key, reports.as_slice()) {
        (Some(_), [report]) => output::render_single(
            &ctx.global.output,
            report,
            |r| detail(r, color),
            |r| r.status.state.to_string(),
        )?,
        _ => output::render_list(
            &ctx.global.output,
            &reports,
            |r| StatusRow {
                key: r.key.clone(),
                state: output::paint_state(r.status.state, color),
                version: r.status.data_version,
                last_success: output::local_time(r.status.last_success),
                next: next(r),
                controller: output::paint_available(r.status.controller_available, color),
                errors: r.status.errors.len(),
            },
            |r| format!("{}\t{}", r.key, r.status.state),
        )?,
    };
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

pub fn targets(ctx: &Context) -> Result<(), CliError> {
    let targets: Vec<TargetSummary> = ctx
        .config
        .redacted()
        .targets()
        .into_iter()
        .map(|(key, target)| TargetSummary { key, target })
        .collect();

    let out = output::render_list(
        &ctx.global.output,
        &targets,
        |t| TargetRow {
            key: t.key.clone(),
            name: t.target.name.clone().unwrap_or_default(),
            plc: t.target.plc_address.clone(),
            banks: t
                .target
                .banks
                .iter()
                .map(|b| format!("{}×{}", b.kind, b.capacity))
                .collect::<Vec<_>>()
                .join(", "),
            locations: t.target.locations.join(", "),
        },
        |t| t.key.clone(),
    )?;
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

fn load_report(key: &str, ctx: &Context) -> Result<StatusReport, CliError> {
    let target = ctx.config.target(key)?;
    let schedule = ctx.config.target_schedule(key)?;
    let status = ctx
        .store()
        .load(key)?
        .unwrap_or_else(|| SyncStatus::new(key.to_owned()));

    Ok(StatusReport {
        key: key.to_owned(),
        name: target.name.unwrap_or_else(|| key.to_owned()),
        phase: SyncPhase::Idle,
        next_scheduled: schedule.next_after(Local::now().naive_local()),
        schedule,
        status,
    })
}

fn next(report: &StatusReport) -> String {
    report
        .next_scheduled
        .map_or_else(|| "disabled".into(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

fn detail(report: &StatusReport, color: bool) -> String {
    let s = &report.status;
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", report.name, report.key);
    let _ = writeln!(out, "  State:        {}", output::paint_state(s.state, color));
    let _ = writeln!(out, "  Data version: {}", s.data_version);
    let _ = writeln!(out, "  Last attempt: {}", output::local_time(s.last_attempt));
    let _ = writeln!(out, "  Last success: {}", output::local_time(s.last_success));
    if let Some(trigger) = s.last_trigger {
        let _ = writeln!(out, "  Trigger:      {trigger}");
    }
    let _ = writeln!(
        out,
        "  Controller:   {}",
        output::paint_available(s.controller_available, color)
    );
    let _ = writeln!(out, "  Schedule:     {}", report.schedule.display_times());
    let _ = writeln!(out, "  Next run:     {}", next(report));
    for (kind, count) in &s.entries_synced {
        let _ = writeln!(out, "  {:<13} {count}", format!("{kind}:"));
    }
    if !s.errors.is_empty() {
        let _ = writeln!(out, "  Errors:");
        for fault in &s.errors {
            let _ = writeln!(out, "    - {fault}");
        }
    }
    out.trim_end().to_owned()
}
