use ndarray::s;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::checkpoint::{CheckpointError, HISTORY_FILE, MODEL_FILE};
use crate::config::RunConfig;
use crate::corpus::{join_tweets, shuffled};
use crate::embedding::EmbeddingTable;
use crate::generator::{generate_text, write_samples, GeneratorError};
use crate::model::{ModelError, SequenceModel};
use crate::tokenizer::Tokenizer;
use crate::windows::{make_windows, SequenceWindows, WindowError};

#[derive(Debug)]
pub enum TrainingError {
    ModelError(ModelError),
    GeneratorError(GeneratorError),
    WindowError(WindowError),
    CheckpointError(CheckpointError),
    IoError(io::Error),
    NoTrainingWindows,
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingError::ModelError(e) => write!(f, "Model error: {}", e),
            TrainingError::GeneratorError(e) => write!(f, "Generation error: {}", e),
            TrainingError::WindowError(e) => write!(f, "Window error: {}", e),
            TrainingError::CheckpointError(e) => write!(f, "Checkpoint error: {}", e),
            TrainingError::IoError(e) => write!(f, "IO error: {}", e),
            TrainingError::NoTrainingWindows => {
                write!(f, "Training text is too short to build a single window")
            }
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainingError::ModelError(e) => Some(e),
            TrainingError::GeneratorError(e) => Some(e),
            TrainingError::WindowError(e) => Some(e),
            TrainingError::CheckpointError(e) => Some(e),
            TrainingError::IoError(e) => Some(e),
            TrainingError::NoTrainingWindows => None,
        }
    }
}

impl From<ModelError> for TrainingError {
    fn from(err: ModelError) -> TrainingError {
        TrainingError::ModelError(err)
    }
}

impl From<GeneratorError> for TrainingError {
    fn from(err: GeneratorError) -> TrainingError {
        TrainingError::GeneratorError(err)
    }
}

impl From<WindowError> for TrainingError {
    fn from(err: WindowError) -> TrainingError {
        TrainingError::WindowError(err)
    }
}

impl From<CheckpointError> for TrainingError {
    fn from(err: CheckpointError) -> TrainingError {
        TrainingError::CheckpointError(err)
    }
}

impl From<io::Error> for TrainingError {
    fn from(err: io::Error) -> TrainingError {
        TrainingError::IoError(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f32,
    pub val_loss: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    /// `epoch,loss,val_loss` rows, one per finished epoch.
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "epoch,loss,val_loss")?;
        for record in &self.epochs {
            match record.val_loss {
                Some(val) => writeln!(writer, "{},{},{}", record.epoch, record.loss, val)?,
                None => writeln!(writer, "{},{},", record.epoch, record.loss)?,
            }
        }
        writer.flush()
    }
}

/// Everything an epoch-end hook may need, passed explicitly.
pub struct EpochContext<'a> {
    pub epoch: usize,
    pub history: &'a TrainingHistory,
    pub model: &'a dyn SequenceModel,
    pub tokenizer: &'a Tokenizer,
    pub table: &'a EmbeddingTable,
    pub config: &'a RunConfig,
}

pub trait EpochEndHandler {
    /// Runs after each epoch. Returning windows replaces the training set
    /// for the following epochs.
    fn on_epoch_end(&mut self, ctx: &EpochContext) -> Result<Option<SequenceWindows>, TrainingError>;
}

/// Handler that does nothing; useful for plain fits.
#[derive(Debug, Default)]
pub struct NoopHandler;

impl EpochEndHandler for NoopHandler {
    fn on_epoch_end(&mut self, _ctx: &EpochContext) -> Result<Option<SequenceWindows>, TrainingError> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingData {
    pub train: SequenceWindows,
    pub validation: SequenceWindows,
}

/// Runs `config.total_epochs` epochs of mini-batch training.
pub fn fit<M, H>(
    model: &mut M,
    data: TrainingData,
    tokenizer: &Tokenizer,
    table: &EmbeddingTable,
    config: &RunConfig,
    handler: &mut H,
) -> Result<TrainingHistory, TrainingError>
where
    M: SequenceModel,
    H: EpochEndHandler + ?Sized,
{
    fit_resumed(model, data, tokenizer, table, config, handler, TrainingHistory::default())
}

/// Continues a run whose first `history.epochs.len()` epochs are done,
/// training only the epochs left up to `config.total_epochs`.
pub fn fit_resumed<M, H>(
    model: &mut M,
    data: TrainingData,
    tokenizer: &Tokenizer,
    table: &EmbeddingTable,
    config: &RunConfig,
    handler: &mut H,
    mut history: TrainingHistory,
) -> Result<TrainingHistory, TrainingError>
where
    M: SequenceModel,
    H: EpochEndHandler + ?Sized,
{
    let TrainingData { mut train, validation } = data;
    let elapsed = history.epochs.len();
    if elapsed >= config.total_epochs {
        log::info!("All {} epochs already done", config.total_epochs);
        return Ok(history);
    }
    if elapsed > 0 {
        log::info!("Resuming after {} epochs, {} left", elapsed, config.total_epochs - elapsed);
    }

    for epoch in elapsed..config.total_epochs {
        if train.is_empty() {
            return Err(TrainingError::NoTrainingWindows);
        }
        let loss = run_epoch(model, &train, config.batch_size)?;
        let val_loss = if validation.is_empty() {
            None
        } else {
            Some(model.evaluate(validation.inputs.view(), validation.targets.view())?)
        };
        match val_loss {
            Some(val) => log::info!("Epoch {}/{} - loss: {:.6} - val_loss: {:.6}", epoch + 1, config.total_epochs, loss, val),
            None => log::info!("Epoch {}/{} - loss: {:.6}", epoch + 1, config.total_epochs, loss),
        }
        history.epochs.push(EpochRecord { epoch, loss, val_loss });

        let ctx = EpochContext {
            epoch,
            history: &history,
            model: &*model,
            tokenizer,
            table,
            config,
        };
        if let Some(windows) = handler.on_epoch_end(&ctx)? {
            train = windows;
        }
    }
    Ok(history)
}

fn run_epoch<M: SequenceModel>(model: &mut M, train: &SequenceWindows, batch_size: usize) -> Result<f32, TrainingError> {
    let n = train.len();
    let mut weighted_loss = 0.0f32;
    for start in (0..n).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(n);
        let loss = model.train_batch(
            train.inputs.slice(s![start..end, .., ..]),
            train.targets.slice(s![start..end, ..]),
        )?;
        weighted_loss += loss * (end - start) as f32;
    }
    Ok(weighted_loss / n as f32)
}

/// Default epoch-end behaviour: model checkpoint, history file, optional
/// text samples and optional reshuffling of the training tweets.
pub struct SamplingHandler {
    run_dir: PathBuf,
    latest_samples: PathBuf,
    train_tweets: Vec<String>,
    rng: StdRng,
}

impl SamplingHandler {
    pub fn new(run_dir: &Path, latest_samples: &Path, train_tweets: Vec<String>, seed: u64) -> Self {
        Self {
            run_dir: run_dir.to_path_buf(),
            latest_samples: latest_samples.to_path_buf(),
            train_tweets,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn epoch_samples_path(&self, epoch: usize) -> PathBuf {
        self.run_dir.join(format!("zepoch_{}.txt", epoch))
    }

    pub fn history_path(&self) -> PathBuf {
        self.run_dir.join(HISTORY_FILE)
    }

    pub fn model_path(&self) -> PathBuf {
        self.run_dir.join(MODEL_FILE)
    }
}

impl EpochEndHandler for SamplingHandler {
    fn on_epoch_end(&mut self, ctx: &EpochContext) -> Result<Option<SequenceWindows>, TrainingError> {
        fs::create_dir_all(&self.run_dir)?;
        let mut history_file = BufWriter::new(File::create(self.history_path())?);
        ctx.history.write_csv(&mut history_file)?;
        ctx.model.save(&self.model_path())?;

        if ctx.config.generate_on_epoch {
            let mut samples = Vec::with_capacity(ctx.config.temperatures.len());
            for &temperature in &ctx.config.temperatures {
                let text = generate_text(
                    ctx.model,
                    ctx.tokenizer,
                    ctx.table,
                    &ctx.config.seed_sentence,
                    ctx.config.generated_text_size,
                    ctx.config.maxlen,
                )?;
                samples.push((temperature, text));
            }
            let mut epoch_file = BufWriter::new(File::create(self.epoch_samples_path(ctx.epoch))?);
            write_samples(&mut epoch_file, &samples)?;
            if let Some(parent) = self.latest_samples.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut latest_file = BufWriter::new(File::create(&self.latest_samples)?);
            write_samples(&mut latest_file, &samples)?;
        }

        if ctx.config.shuffle_on_epoch {
            let tweets = shuffled(&self.train_tweets, &mut self.rng);
            let (windows, _) = make_windows(ctx.tokenizer, ctx.table, &join_tweets(&tweets), ctx.config.maxlen)?;
            return Ok(Some(windows));
        }
        Ok(None)
    }
}
