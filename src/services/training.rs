//! Training and export through the Ultralytics `yolo` command line.
//!
//! Training itself happens in the child process; this module builds the
//! invocation, waits for it, and moves the resulting weights into place.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::core::errors::{TrainingError, TrainingResult};

/// Hyperparameters forwarded to `yolo detect train`
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub model: String,
    pub data: String,
    pub epochs: u32,
    pub imgsz: u32,
    pub batch: u32,
    pub run_name: String,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            model: "yolov8m.pt".to_string(),
            data: "data/data.yaml".to_string(),
            epochs: 50,
            imgsz: 640,
            batch: 8,
            run_name: "cloth_stain_detector".to_string(),
        }
    }
}

/// Where the best checkpoint of a run lands
pub fn best_weights_path(runs_root: &Path, run_name: &str) -> PathBuf {
    runs_root
        .join("detect")
        .join(run_name)
        .join("weights")
        .join("best.pt")
}

/// Result of looking for a finished run's checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsOutcome {
    Copied { from: PathBuf, to: PathBuf },
    Missing(PathBuf),
}

/// Copy `runs/detect/<run_name>/weights/best.pt` to `output` when it exists
pub fn promote_best_weights(
    runs_root: &Path,
    run_name: &str,
    output: &Path,
) -> TrainingResult<WeightsOutcome> {
    let best = best_weights_path(runs_root, run_name);
    if !best.is_file() {
        return Ok(WeightsOutcome::Missing(best));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| TrainingError::CopyWeightsFailed {
            from: best.clone(),
            to: output.to_path_buf(),
            source,
        })?;
    }

    fs::copy(&best, output).map_err(|source| TrainingError::CopyWeightsFailed {
        from: best.clone(),
        to: output.to_path_buf(),
        source,
    })?;

    Ok(WeightsOutcome::Copied {
        from: best,
        to: output.to_path_buf(),
    })
}

/// Handle on the `yolo` executable
#[derive(Debug, Clone)]
pub struct YoloCli {
    program: String,
    working_dir: Option<PathBuf>,
}

impl YoloCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
        }
    }

    /// Run the child in `dir`; `runs/` is created relative to it
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Directory holding `runs/` after a call
    pub fn runs_root(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("runs")
    }

    pub fn train_args(options: &TrainOptions) -> Vec<String> {
        vec![
            "detect".to_string(),
            "train".to_string(),
            format!("model={}", options.model),
            format!("data={}", options.data),
            format!("epochs={}", options.epochs),
            format!("imgsz={}", options.imgsz),
            format!("batch={}", options.batch),
            format!("name={}", options.run_name),
            // reuse the run directory so the weights path is predictable
            "exist_ok=True".to_string(),
        ]
    }

    pub fn export_args(weights: &Path, imgsz: u32) -> Vec<String> {
        vec![
            "export".to_string(),
            format!("model={}", weights.display()),
            "format=onnx".to_string(),
            format!("imgsz={}", imgsz),
        ]
    }

    /// Train once, blocking until the child exits
    pub fn train(&self, options: &TrainOptions) -> TrainingResult<()> {
        info!(
            "Training {} on {} for {} epochs (imgsz={}, batch={}, run={})",
            options.model, options.data, options.epochs, options.imgsz, options.batch, options.run_name
        );
        self.run("train", &Self::train_args(options))
    }

    /// Export `weights` to ONNX next to it and return the `.onnx` path
    pub fn export_onnx(&self, weights: &Path, imgsz: u32) -> TrainingResult<PathBuf> {
        info!("Exporting {} to ONNX (imgsz={})", weights.display(), imgsz);
        self.run("export", &Self::export_args(weights, imgsz))?;
        Ok(weights.with_extension("onnx"))
    }

    fn run(&self, task: &str, args: &[String]) -> TrainingResult<()> {
        debug!("Spawning {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let status = command.status().map_err(|source| TrainingError::SpawnFailed {
            program: self.program.clone(),
            source,
        })?;

        if !status.success() {
            return Err(TrainingError::CommandFailed {
                program: self.program.clone(),
                task: task.to_string(),
                status,
            });
        }
        Ok(())
    }
}

impl Default for YoloCli {
    fn default() -> Self {
        Self::new("yolo")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_train_args_are_key_value_pairs() {
        let options = TrainOptions {
            epochs: 3,
            run_name: "smoke".to_string(),
            ..TrainOptions::default()
        };

        let args = YoloCli::train_args(&options);
        assert_eq!(&args[..2], &["detect", "train"]);
        assert!(args.contains(&"model=yolov8m.pt".to_string()));
        assert!(args.contains(&"data=data/data.yaml".to_string()));
        assert!(args.contains(&"epochs=3".to_string()));
        assert!(args.contains(&"imgsz=640".to_string()));
        assert!(args.contains(&"batch=8".to_string()));
        assert!(args.contains(&"name=smoke".to_string()));
    }

    #[test]
    fn test_export_args() {
        let args = YoloCli::export_args(Path::new("best6.pt"), 640);
        assert_eq!(args, vec!["export", "model=best6.pt", "format=onnx", "imgsz=640"]);
    }

    #[test]
    fn test_best_weights_path_layout() {
        let path = best_weights_path(Path::new("runs"), "cloth_stain_detector");
        assert_eq!(
            path,
            Path::new("runs/detect/cloth_stain_detector/weights/best.pt")
        );
    }

    #[test]
    fn test_promote_copies_existing_weights() {
        let dir = tempdir().unwrap();
        let runs = dir.path().join("runs");
        let best = best_weights_path(&runs, "r1");
        fs::create_dir_all(best.parent().unwrap()).unwrap();
        fs::write(&best, b"weights").unwrap();
        let output = dir.path().join("best6.pt");

        let outcome = promote_best_weights(&runs, "r1", &output).unwrap();

        assert!(matches!(outcome, WeightsOutcome::Copied { .. }));
        assert_eq!(fs::read(&output).unwrap(), b"weights");
    }

    #[test]
    fn test_promote_reports_missing_weights() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("best6.pt");

        let outcome = promote_best_weights(&dir.path().join("runs"), "r1", &output).unwrap();

        assert!(matches!(outcome, WeightsOutcome::Missing(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_program_is_a_spawn_error() {
        let cli = YoloCli::new("definitely-not-a-real-yolo-binary");
        let err = cli.train(&TrainOptions::default()).unwrap_err();
        assert!(matches!(err, TrainingError::SpawnFailed { .. }));
    }

    #[test]
    fn test_runs_root_follows_working_dir() {
        let cli = YoloCli::default().in_dir("/tmp/project");
        assert_eq!(cli.runs_root(), PathBuf::from("/tmp/project/runs"));
    }
}
