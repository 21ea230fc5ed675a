use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::training::{EpochRecord, TrainingHistory};

/// Model state saved after every epoch.
pub const MODEL_FILE: &str = "model.json";
/// Per-epoch losses, rewritten after every epoch.
pub const HISTORY_FILE: &str = "history.csv";
/// Failure report left in the run folder when training stops on an error.
pub const ERROR_LOG_FILE: &str = "error.log";

#[derive(Debug)]
pub enum CheckpointError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    NoPreviousRun(String),
    MalformedHistory { line: usize, content: String },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::IoError(e) => write!(f, "Checkpoint IO error: {}", e),
            CheckpointError::JsonError(e) => write!(f, "Checkpoint JSON error: {}", e),
            CheckpointError::ShapeMismatch { expected, got } => write!(
                f,
                "Saved model has shape {:?}, the run needs {:?}",
                got, expected
            ),
            CheckpointError::NoPreviousRun(dir) => write!(f, "No run to resume under {}", dir),
            CheckpointError::MalformedHistory { line, content } => {
                write!(f, "Malformed history line {}: '{}'", line, content)
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::IoError(e) => Some(e),
            CheckpointError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CheckpointError {
    fn from(err: io::Error) -> CheckpointError {
        CheckpointError::IoError(err)
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> CheckpointError {
        CheckpointError::JsonError(err)
    }
}

/// Newest run folder under `model_dir`.
///
/// Run folders are named by `%y_%m_%d-%H_%M` timestamps, so the
/// lexicographically greatest name is the latest run.
pub fn latest_run_dir(model_dir: &Path) -> Result<PathBuf, CheckpointError> {
    let no_run = || CheckpointError::NoPreviousRun(model_dir.display().to_string());
    let entries = match fs::read_dir(model_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(no_run()),
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<PathBuf> = None;
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if latest.as_ref().map_or(true, |best| path.file_name() > best.file_name()) {
            latest = Some(path);
        }
    }
    latest.ok_or_else(no_run)
}

/// Parses `epoch,loss,val_loss` rows as written by [`TrainingHistory::write_csv`].
pub fn read_history<R: BufRead>(reader: R) -> Result<TrainingHistory, CheckpointError> {
    let mut history = TrainingHistory::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let malformed = || CheckpointError::MalformedHistory {
            line: i + 1,
            content: line.clone(),
        };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 3 {
            return Err(malformed());
        }
        let epoch = fields[0].trim().parse::<usize>().map_err(|_| malformed())?;
        let loss = fields[1].trim().parse::<f32>().map_err(|_| malformed())?;
        let val_loss = match fields[2].trim() {
            "" => None,
            v => Some(v.parse::<f32>().map_err(|_| malformed())?),
        };
        history.epochs.push(EpochRecord { epoch, loss, val_loss });
    }
    Ok(history)
}

/// History of a run folder; a run that never finished an epoch has none.
pub fn load_history(run_dir: &Path) -> Result<TrainingHistory, CheckpointError> {
    match File::open(run_dir.join(HISTORY_FILE)) {
        Ok(file) => read_history(BufReader::new(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(TrainingHistory::default()),
        Err(e) => Err(e.into()),
    }
}

/// Writes an error and its `source()` chain to `error.log` in `run_dir`.
pub fn write_error_log(run_dir: &Path, err: &(dyn std::error::Error + 'static)) -> io::Result<PathBuf> {
    let path = run_dir.join(ERROR_LOG_FILE);
    let mut file = File::create(&path)?;
    writeln!(file, "Training error: {}", err)?;
    let mut current = err.source();
    while let Some(source) = current {
        writeln!(file, "Caused by: {}", source)?;
        current = source.source();
    }
    file.flush()?;
    Ok(path)
}
