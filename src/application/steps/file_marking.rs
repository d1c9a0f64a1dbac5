use crate::application::step::{JobContext, Step};
use crate::config::MarkingFailurePolicy;
use crate::domain::run::StepReport;
use crate::error::{BatchError, Result};
use crate::interfaces::files::{mark_done, scan_suffix};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Renames ingested remittance files so later runs skip them.
///
/// Only files that were in the ingestion snapshot and are still present are
/// marked. Without a snapshot every matching file is marked.
pub struct FileMarkingStep {
    suffix: String,
    marker: String,
    policy: MarkingFailurePolicy,
}

impl FileMarkingStep {
    pub const NAME: &'static str = "file_marking";

    pub fn new(
        suffix: impl Into<String>,
        marker: impl Into<String>,
        policy: MarkingFailurePolicy,
    ) -> Self {
        Self {
            suffix: suffix.into(),
            marker: marker.into(),
            policy,
        }
    }
}

#[async_trait]
impl Step for FileMarkingStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<StepReport> {
        let input_dir = ctx
            .input_dir
            .clone()
            .ok_or_else(|| BatchError::Config("file marking needs an input directory".into()))?;

        let mut eligible = scan_suffix(&input_dir, &self.suffix)?;
        if let Some(snapshot) = &ctx.snapshot {
            eligible.retain(|path| {
                let ingested = snapshot.contains(path);
                if !ingested {
                    debug!(file = %path.display(), "Left for the next run");
                }
                ingested
            });
        }

        let mut report = StepReport {
            read_count: eligible.len(),
            ..Default::default()
        };
        let mut first_failure = None;

        for path in &eligible {
            match mark_done(path, &self.marker) {
                Ok(target) => {
                    info!(file = %target.display(), "Marked remittance file");
                    report.write_count += 1;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Could not mark remittance file");
                    report.skip_count += 1;
                    first_failure.get_or_insert(e);
                }
            }
        }

        match (first_failure, self.policy) {
            (Some(e), MarkingFailurePolicy::FailJob) => Err(e),
            _ => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_marking_is_idempotent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.remise"), "x").unwrap();
        fs::write(dir.path().join("b.remise"), "x").unwrap();

        let step = FileMarkingStep::new("remise", "DONE", MarkingFailurePolicy::FailJob);
        let mut ctx = JobContext::default().with_input_dir(dir.path());

        let first = step.execute(&mut ctx).await.unwrap();
        assert_eq!(first.write_count, 2);
        assert_eq!(names(dir.path()), vec!["a.remise.DONE", "b.remise.DONE"]);

        let second = step.execute(&mut ctx).await.unwrap();
        assert_eq!(second.read_count, 0);
        assert_eq!(second.write_count, 0);
        assert_eq!(names(dir.path()), vec!["a.remise.DONE", "b.remise.DONE"]);
    }

    #[tokio::test]
    async fn test_file_added_after_snapshot_is_not_marked() {
        let dir = tempdir().unwrap();
        let ingested = dir.path().join("a.remise");
        fs::write(&ingested, "x").unwrap();
        fs::write(dir.path().join("late.remise"), "x").unwrap();

        let step = FileMarkingStep::new("remise", "DONE", MarkingFailurePolicy::FailJob);
        let mut ctx = JobContext::default().with_input_dir(dir.path());
        ctx.snapshot = Some(vec![ingested]);

        let report = step.execute(&mut ctx).await.unwrap();
        assert_eq!(report.write_count, 1);
        assert_eq!(names(dir.path()), vec!["a.remise.DONE", "late.remise"]);
    }

    #[tokio::test]
    async fn test_failure_policy() {
        let dir = tempdir().unwrap();
        let vanished = dir.path().join("gone.remise");
        fs::write(dir.path().join("a.remise"), "x").unwrap();

        let mut ctx = JobContext::default().with_input_dir(dir.path());
        // Renaming onto a non-empty directory fails
        fs::create_dir(dir.path().join("a.remise.DONE")).unwrap();
        fs::write(dir.path().join("a.remise.DONE").join("keep"), "x").unwrap();
        ctx.snapshot = Some(vec![dir.path().join("a.remise"), vanished]);

        let strict = FileMarkingStep::new("remise", "DONE", MarkingFailurePolicy::FailJob);
        assert!(matches!(
            strict.execute(&mut ctx).await,
            Err(BatchError::Filesystem { .. })
        ));

        let lenient = FileMarkingStep::new("remise", "DONE", MarkingFailurePolicy::Continue);
        let report = lenient.execute(&mut ctx).await.unwrap();
        assert_eq!(report.skip_count, 1);
        assert_eq!(report.write_count, 0);
    }
}
