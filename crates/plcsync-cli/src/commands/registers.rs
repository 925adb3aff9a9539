//! Register views: read back the controller, or preview a plan.

use std::fmt::Write as _;

use chrono::Local;
use serde::Serialize;
use tabled::Tabled;

use plcsync_core::{BankReadback, SyncPlan};

use crate::cli::PlanArgs;
use crate::commands::{Context, util};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Bank")]
    bank: String,
    #[tabled(rename = "Slot")]
    slot: usize,
    #[tabled(rename = "Values")]
    values: String,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Bank")]
    bank: String,
    #[tabled(rename = "Slot")]
    slot: usize,
    #[tabled(rename = "When")]
    category: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Label")]
    label: String,
}

/// One decoded slot, flattened for list output.
#[derive(Serialize)]
struct SlotLine {
    bank: String,
    slot: usize,
    fields: Vec<String>,
    values: Vec<i64>,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn read(key: &str, ctx: &Context) -> Result<(), CliError> {
    let sync = ctx.synchronizer(key)?;
    let banks = sync
        .read_registers()
        .await
        .map_err(|e| CliError::for_target(key, e))?;

    let lines = occupied_slots(&banks);
    let out = output::render_list(
        &ctx.global.output,
        &lines,
        |l| SlotRow {
            bank: l.bank.clone(),
            slot: l.slot,
            values: format_values(l),
        },
        |l| format!("{} {} {}", l.bank, l.slot, format_values(l)),
    )?;
    output::print_output(&out, ctx.global.quiet);
    if lines.is_empty() && !ctx.global.quiet {
        eprintln!("All slots are empty");
    }
    Ok(())
}

pub fn plan(args: &PlanArgs, ctx: &Context) -> Result<(), CliError> {
    let now = match &args.at {
        Some(raw) => util::parse_local(raw)?,
        None => Local::now().naive_local(),
    };
    let sync = ctx.synchronizer(&args.target)?;
    let plan = sync.plan(now)?;

    let out = output::render_single(
        &ctx.global.output,
        &plan,
        render_plan_table,
        |p| {
            p.registers()
                .map(|r| format!("{}={}", r.address, r.value))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

fn occupied_slots(banks: &[BankReadback]) -> Vec<SlotLine> {
    banks
        .iter()
        .flat_map(|bank| {
            bank.slots.iter().filter(|s| !s.empty).map(|s| SlotLine {
                bank: bank.kind.to_string(),
                slot: s.slot,
                fields: bank.fields.iter().map(ToString::to_string).collect(),
                values: s.values.clone(),
            })
        })
        .collect()
}

/// `dd/mm` for holidays, `dd/mm hh:mm-hh:mm` for events.
fn format_values(line: &SlotLine) -> String {
    match line.values.as_slice() {
        [day, month] => format!("{day:02}/{month:02}"),
        [day, month, sh, sm, eh, em] => {
            format!("{day:02}/{month:02} {sh:02}:{sm:02}-{eh:02}:{em:02}")
        }
        other => other
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn render_plan_table(plan: &SyncPlan) -> String {
    let rows: Vec<PlanRow> = plan
        .banks
        .iter()
        .flat_map(|bank| {
            bank.allocation.assignments.iter().map(|a| PlanRow {
                bank: bank.kind.to_string(),
                slot: a.slot,
                category: a.category.to_string(),
                date: a.entry.date.format("%d/%m/%Y").to_string(),
                time: a.entry.time.map_or_else(
                    || "all day".into(),
                    |t| format!("{}-{}", t.start.format("%H:%M"), t.end.format("%H:%M")),
                ),
                label: a.entry.device_label(),
            })
        })
        .collect();

    let mut out = if rows.is_empty() {
        "Nothing to write; every slot will be zeroed".to_owned()
    } else {
        tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string()
    };

    let dropped: usize = plan.banks.iter().map(|b| b.allocation.dropped.len()).sum();
    if dropped > 0 {
        let _ = write!(out, "\n{dropped} entr(ies) did not fit and will not be written");
    }
    out
}
