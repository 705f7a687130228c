use tracing::{info, warn};

use cadence_core::{
    aligner_max_checks, parse_creation_timestamp, CadenceError, MissedBoundary, Schedule, ScheduleSpec,
};

use crate::context::RunContext;

/// Creation timestamp must land within this many seconds of the activation call.
pub const MAX_CREATION_DRIFT_SECS: i64 = 60;

/// Waits for the first period boundary and activates the schedule there.
pub struct Aligner<'a> {
    ctx: &'a RunContext,
}

impl<'a> Aligner<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Returns `None` only when no boundary was seen and the run is configured to skip.
    pub fn align_and_activate(&self) -> Result<Option<Schedule>, CadenceError> {
        let period = self.ctx.run.period;
        let poll = self.ctx.cfg.aligner_poll();
        let max_checks = aligner_max_checks(period, poll);
        for check in 0..max_checks {
            self.ctx.sleep(poll, "align")?;
            let now = self.ctx.clock.now();
            if period.is_boundary(now) {
                info!(check, at = %now, "period boundary reached");
                return self.activate().map(Some);
            }
        }
        match self.ctx.cfg.aligner.on_missed_boundary {
            MissedBoundary::Fail => Err(CadenceError::AlignmentMissed { checks: max_checks }),
            MissedBoundary::Skip => {
                warn!(checks = max_checks, "no period boundary observed; schedule not activated");
                Ok(None)
            }
        }
    }

    fn activate(&self) -> Result<Schedule, CadenceError> {
        let spec = ScheduleSpec::for_run(&self.ctx.run);
        let activated_at = self.ctx.clock.now();
        self.ctx.call("schedule create", |p, budget| p.create_schedule(&spec, budget))?;
        let raw = self
            .ctx
            .call("schedule get", |p, budget| p.schedule_creation_timestamp(&spec.name, budget))?;
        let created_at = parse_creation_timestamp(spec.name.as_str(), &raw)?;
        let drift = (created_at - activated_at).num_seconds().abs();
        if drift >= MAX_CREATION_DRIFT_SECS {
            return Err(CadenceError::assertion(
                "creation timestamp",
                format!("within {MAX_CREATION_DRIFT_SECS}s of {activated_at}"),
                format!("{created_at} ({drift}s away)"),
            ));
        }
        info!(schedule = %spec.name, cron = %spec.cron, %created_at, "schedule activated");
        Ok(Schedule { name: spec.name, cron: spec.cron, activated_at, created_at })
    }
}
