//! Run-scoped diagnostic artifacts: screenshots and structured error
//! reports, keyed by step name and timestamp. Append-only; nothing here is
//! read back during the run.

use std::path::{Path, PathBuf};

use chrono::Utc;
use gauntlet_common::{FlowError, Result};
use serde_json::json;

pub struct ArtifactRecorder {
    dir: PathBuf,
}

impl ArtifactRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stamped(&self, subdir: &str, step: &str, ext: &str) -> Result<PathBuf> {
        let dir = self.dir.join(subdir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| FlowError::Other(anyhow::Error::new(e).context("creating artifact dir")))?;
        let name = format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            step.replace(' ', "_"),
            ext
        );
        Ok(dir.join(name))
    }

    /// Persist a screenshot for `step`, returning the written path.
    pub fn record_screenshot(&self, step: &str, png: &[u8]) -> Result<PathBuf> {
        let path = self.stamped("screenshots", step, "png")?;
        std::fs::write(&path, png)
            .map_err(|e| FlowError::Other(anyhow::Error::new(e).context("writing screenshot")))?;
        Ok(path)
    }

    /// Persist a structured error report for `step`. Page URL and HTML are
    /// included when the session could still provide them.
    pub fn record_error_report(
        &self,
        step: &str,
        error: &FlowError,
        url: Option<&str>,
        html: Option<&str>,
    ) -> Result<PathBuf> {
        let path = self.stamped("error-logs", step, "json")?;
        let report = json!({
            "step": step,
            "time": Utc::now().to_rfc3339(),
            "kind": error.kind(),
            "message": error.to_string(),
            "url": url,
            "html": html,
        });
        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| FlowError::Other(anyhow::Error::new(e)))?;
        std::fs::write(&path, body)
            .map_err(|e| FlowError::Other(anyhow::Error::new(e).context("writing error report")))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn screenshot_lands_under_screenshots_with_step_name() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = ArtifactRecorder::new(tmp.path());
        let path = recorder.record_screenshot("before navigate", b"png-bytes").unwrap();
        assert!(path.starts_with(tmp.path().join("screenshots")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-before_navigate.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
    }

    #[test]
    fn error_report_carries_classification_and_context() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = ArtifactRecorder::new(tmp.path());
        let err = FlowError::PreconditionTimeout {
            what: "#main".into(),
            timeout: Duration::from_secs(30),
        };
        let path = recorder
            .record_error_report("navigate", &err, Some("https://example.com"), None)
            .unwrap();
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(report["step"], "navigate");
        assert_eq!(report["kind"], "precondition_timeout");
        assert_eq!(report["url"], "https://example.com");
        assert!(report["html"].is_null());
    }

    #[test]
    fn unwritable_dir_surfaces_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("taken");
        std::fs::write(&blocker, b"file, not dir").unwrap();
        let recorder = ArtifactRecorder::new(&blocker);
        assert!(recorder.record_screenshot("x", b"y").is_err());
    }
}
