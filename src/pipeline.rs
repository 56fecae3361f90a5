//! The import itself, in two phases.
//!
//! [`plan`] only reads: it picks the monitored modules and fails with
//! [`ImportError::NoModulesFound`] when there are none. [`execute`] is where
//! anything gets written: the optional purge, one fetch and upsert per module,
//! then a single course code backfill. A run that finds no modules therefore
//! never purges.

use anyhow::{Context, Result};
use tracing::{info, info_span, warn, Instrument};

use crate::{
    common::ImportError,
    data::{store::Store, AttendanceKey, MonitoredModule},
    params::RunParams,
    report::{ImportSummary, Reporter},
    semesters::SemesterCalendar,
    tds::AttendanceSource,
};

/// Modules to import for a validated set of parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub params: RunParams,
    pub modules: Vec<MonitoredModule>,
}

pub fn plan(params: &RunParams, store: &Store, reporter: &Reporter) -> Result<Plan> {
    let (ay, week) = (params.ay.get(), params.week.get());
    let modules = store
        .monitored_modules(ay, week)
        .context("failed to look up monitored modules")?;

    if modules.is_empty() {
        reporter.no_modules();
        return Err(ImportError::NoModulesFound { ay, week }.into());
    }

    info!(count = modules.len(), "modules monitored this week");
    Ok(Plan {
        params: params.clone(),
        modules,
    })
}

pub async fn execute<S: AttendanceSource>(
    plan: &Plan,
    store: &mut Store,
    source: &S,
    calendar: &SemesterCalendar,
    reporter: &Reporter,
) -> Result<ImportSummary> {
    let params = &plan.params;

    if params.del_existing {
        let deleted = store.purge_attendance()?;
        warn!(deleted, "deleted all existing attendance");
    }

    let mut created = 0;
    for module in &plan.modules {
        created += import_module(module, params, store, source, calendar)
            .instrument(info_span!("module", id = %module.id))
            .await?;
    }

    let backfilled = store.backfill_course_codes()?;
    info!(backfilled, "course codes backfilled");

    let summary = ImportSummary {
        created,
        total: store.count_for_week(params.week.get(), params.ay.get())?,
    };
    reporter.completion(&summary);
    Ok(summary)
}

/// Fetches one module's attendance and upserts every item. Returns how many
/// rows were new.
async fn import_module<S: AttendanceSource>(
    module: &MonitoredModule,
    params: &RunParams,
    store: &Store,
    source: &S,
    calendar: &SemesterCalendar,
) -> Result<u64> {
    // unknown semesters fail before the request goes out
    let module_ay = calendar.academic_year_of(&module.id)?;

    let items = source.fetch(module).await?;

    let mut created = 0;
    for item in &items {
        let key = AttendanceKey {
            student_id: &item.student_id,
            module_id: &module.id,
            week: params.week.get(),
            week_ay: params.ay.get(),
        };
        if store
            .upsert_attendance(key, module_ay, item)
            .with_context(|| format!("failed to store attendance for student {}", item.student_id))?
        {
            created += 1;
        }
    }

    info!(items = items.len(), created, "module imported");
    Ok(created)
}

/// Logs the startup record, then plans and executes.
pub async fn run<S: AttendanceSource>(
    params: &RunParams,
    base_url: &str,
    store: &mut Store,
    source: &S,
    calendar: &SemesterCalendar,
    reporter: &Reporter,
) -> Result<ImportSummary> {
    reporter.startup(params.report_by, base_url, &params.del_existing_raw, params.week);
    let plan = plan(params, store, reporter)?;
    execute(&plan, store, source, calendar, reporter).await
}
