use super::step::{JobContext, Step};
use crate::domain::ports::ExecutionLedger;
use crate::domain::run::{ExecutionStatus, RunId, StepOutcome};
use tracing::{error, info};

/// An ordered list of steps executed as one run.
pub struct Job {
    name: &'static str,
    steps: Vec<Box<dyn Step>>,
}

impl Job {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs the steps in order, reporting every transition to `ledger`.
    ///
    /// The first failing step ends the run; later steps are never started.
    /// Files produced by a step are recorded even when that step fails.
    pub async fn run(
        &self,
        run_id: RunId,
        ctx: &mut JobContext,
        ledger: &dyn ExecutionLedger,
    ) -> ExecutionStatus {
        info!(%run_id, job = self.name, "Job started");

        for step in &self.steps {
            let name = step.name();
            ledger.step_started(run_id, name).await;
            info!(%run_id, step = name, "Step started");

            let result = step.execute(ctx).await;

            if !ctx.lot_files.is_empty() {
                ledger.record_lot_files(run_id, &ctx.lot_files).await;
            }
            if !ctx.control_files.is_empty() {
                ledger.record_control_files(run_id, &ctx.control_files).await;
            }

            match result {
                Ok(report) => {
                    info!(
                        %run_id,
                        step = name,
                        read = report.read_count,
                        written = report.write_count,
                        skipped = report.skip_count,
                        "Step completed"
                    );
                    ledger
                        .step_finished(run_id, name, StepOutcome::Completed(report))
                        .await;
                }
                Err(e) => {
                    error!(%run_id, step = name, error = %e, "Step failed");
                    ledger
                        .step_finished(run_id, name, StepOutcome::Failed(e.to_string()))
                        .await;
                    ledger.job_finished(run_id, ExecutionStatus::Failed).await;
                    return ExecutionStatus::Failed;
                }
            }
        }

        ledger.job_finished(run_id, ExecutionStatus::Completed).await;
        info!(%run_id, job = self.name, "Job completed");
        ExecutionStatus::Completed
    }
}
