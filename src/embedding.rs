use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_stats::errors::MinMaxError;
use ndarray_stats::QuantileExt;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// End-of-text marker placed between independent tweets.
pub const EOT_TOKEN: &str = "<eot>";

#[derive(Debug)]
pub enum EmbeddingError {
    IoError(io::Error),
    EmptyTable,
    DegenerateRange(f32),
    NonFiniteValue,
    DimensionMismatch { word: String, expected: usize, got: usize },
}

impl std::fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingError::IoError(e) => write!(f, "Embedding resource IO error: {}", e),
            EmbeddingError::EmptyTable => write!(f, "Embedding table has no valid entries"),
            EmbeddingError::DegenerateRange(v) => {
                write!(f, "All embedding values equal {}, cannot normalize", v)
            }
            EmbeddingError::NonFiniteValue => write!(f, "Embedding table contains non-finite values"),
            EmbeddingError::DimensionMismatch { word, expected, got } => write!(
                f,
                "Vector for '{}' has length {}, expected {}",
                word, got, expected
            ),
        }
    }
}

impl std::error::Error for EmbeddingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmbeddingError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EmbeddingError {
    fn from(err: io::Error) -> EmbeddingError {
        EmbeddingError::IoError(err)
    }
}

impl From<MinMaxError> for EmbeddingError {
    fn from(err: MinMaxError) -> EmbeddingError {
        match err {
            MinMaxError::EmptyInput => EmbeddingError::EmptyTable,
            MinMaxError::UndefinedOrder => EmbeddingError::NonFiniteValue,
        }
    }
}

/// Summary of a resource load, reported once the scan is complete.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadReport {
    pub loaded: usize,
    pub wrong_sized: usize,
    pub raw_min: f32,
    pub raw_max: f32,
}

/// Miss accounting for one `vectorize` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorizeReport {
    pub total: usize,
    pub misses: usize,
}

impl VectorizeReport {
    pub fn found(&self) -> usize {
        self.total - self.misses
    }

    /// Fraction of tokens absent from the table; 0.0 for empty input.
    pub fn miss_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.misses as f32 / self.total as f32
        }
    }
}

/// Word to vector table, rows kept in insertion order.
///
/// Immutable once built. Row order matters: nearest-word ties resolve to the
/// earliest row.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    words: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Array2<f32>,
}

impl EmbeddingTable {
    /// Loads a whitespace-delimited `word f1 .. fK` resource.
    ///
    /// Lines whose coefficient count is not `vector_len - 1` (or that fail to
    /// parse) are skipped and counted. A trailing 0.0 coordinate is appended
    /// to every entry, the whole table is mapped into [-1, 1] with one global
    /// affine transform, and the `<eot>` sentinel is added last.
    pub fn load(path: &Path, vector_len: usize) -> Result<(Self, LoadReport), EmbeddingError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut entries: Vec<(String, Vec<f32>)> = Vec::new();
        let mut wrong_sized = 0usize;

        for line in reader.lines() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let word = match parts.next() {
                Some(w) => w.to_string(),
                None => {
                    wrong_sized += 1;
                    continue;
                }
            };
            let coefs: Result<Vec<f32>, _> = parts.map(str::parse::<f32>).collect();
            match coefs {
                Ok(mut coefs) if coefs.len() + 1 == vector_len && coefs.iter().all(|v| v.is_finite()) => {
                    coefs.push(0.0);
                    entries.push((word, coefs));
                }
                _ => wrong_sized += 1,
            }
        }

        let mut table = Self::from_vectors(entries, vector_len)?;
        let (raw_min, raw_max) = table.normalize()?;
        let loaded = table.len();
        table.insert(EOT_TOKEN, eot_vector(vector_len).view())?;

        let report = LoadReport {
            loaded,
            wrong_sized,
            raw_min,
            raw_max,
        };
        log::info!("min: {}", raw_min);
        log::info!("max: {}", raw_max);
        log::info!("wrong size: {}", wrong_sized);
        log::info!("Found {} word vectors.", table.len());

        let histogram = value_histogram(table.vectors.iter(), 20);
        log::debug!("Normalized value distribution: {:?}", histogram);

        Ok((table, report))
    }

    /// Builds a table from vectors used exactly as given.
    ///
    /// A repeated word overwrites the earlier vector but keeps its row.
    pub fn from_vectors<I, S>(entries: I, vector_len: usize) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        let mut words = Vec::new();
        let mut index = HashMap::new();
        let mut flat: Vec<f32> = Vec::new();

        for (word, vector) in entries {
            let word: String = word.into();
            if vector.len() != vector_len {
                return Err(EmbeddingError::DimensionMismatch {
                    word,
                    expected: vector_len,
                    got: vector.len(),
                });
            }
            match index.get(&word) {
                Some(&row) => {
                    let start = row * vector_len;
                    flat[start..start + vector_len].copy_from_slice(&vector);
                }
                None => {
                    index.insert(word.clone(), words.len());
                    words.push(word);
                    flat.extend_from_slice(&vector);
                }
            }
        }

        let vectors = Array2::from_shape_vec((words.len(), vector_len), flat)
            .map_err(|_| EmbeddingError::EmptyTable)?;
        Ok(Self { words, index, vectors })
    }

    /// Rescales every coordinate with `(v - min) / ((max - min) / 2) - 1`.
    /// Returns the raw `(min, max)` that were scanned.
    fn normalize(&mut self) -> Result<(f32, f32), EmbeddingError> {
        let min = *self.vectors.min()?;
        let max = *self.vectors.max()?;
        let scale = (max - min) / 2.0;
        if !scale.is_finite() {
            return Err(EmbeddingError::NonFiniteValue);
        }
        if scale <= 0.0 {
            return Err(EmbeddingError::DegenerateRange(min));
        }
        self.vectors.mapv_inplace(|v| (v - min) / scale - 1.0);
        Ok((min, max))
    }

    fn insert(&mut self, word: &str, vector: ArrayView1<f32>) -> Result<(), EmbeddingError> {
        if vector.len() != self.vector_len() {
            return Err(EmbeddingError::DimensionMismatch {
                word: word.to_string(),
                expected: self.vector_len(),
                got: vector.len(),
            });
        }
        match self.index.get(word) {
            Some(&row) => self.vectors.row_mut(row).assign(&vector),
            None => {
                self.vectors
                    .push_row(vector)
                    .map_err(|_| EmbeddingError::DimensionMismatch {
                        word: word.to_string(),
                        expected: self.vectors.ncols(),
                        got: vector.len(),
                    })?;
                self.index.insert(word.to_string(), self.words.len());
                self.words.push(word.to_string());
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn vector_len(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    pub fn get(&self, word: &str) -> Option<ArrayView1<f32>> {
        self.index.get(word).map(|&row| self.vectors.row(row))
    }

    pub fn word_at(&self, row: usize) -> Option<&str> {
        self.words.get(row).map(String::as_str)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn vectors(&self) -> ArrayView2<f32> {
        self.vectors.view()
    }

    /// Placeholder vector for unknown tokens. `vectorize` drops misses
    /// instead of substituting this.
    pub fn unknown_vector(&self) -> Array1<f32> {
        eot_vector(self.vector_len())
    }

    /// Looks up each token in order. Tokens absent from the table are
    /// counted and omitted, so the output may have fewer rows than `tokens`.
    pub fn vectorize<S: AsRef<str>>(&self, tokens: &[S]) -> (Array2<f32>, VectorizeReport) {
        let rows: Vec<usize> = tokens
            .iter()
            .filter_map(|t| self.index.get(t.as_ref()).copied())
            .collect();
        let report = VectorizeReport {
            total: tokens.len(),
            misses: tokens.len() - rows.len(),
        };
        (self.vectors.select(Axis(0), &rows), report)
    }
}

/// `<eot>` vector: zeros with the trailing flag coordinate set.
pub fn eot_vector(vector_len: usize) -> Array1<f32> {
    let mut v = Array1::zeros(vector_len);
    if vector_len > 0 {
        v[vector_len - 1] = 1.0;
    }
    v
}

/// Equal-width histogram of a value stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lower: f32,
    pub upper: f32,
    pub counts: Vec<usize>,
}

pub fn value_histogram<'a, I>(values: I, bins: usize) -> Histogram
where
    I: IntoIterator<Item = &'a f32>,
{
    let values: Array1<f32> = values.into_iter().copied().filter(|v| v.is_finite()).collect();
    let mut counts = vec![0usize; bins];
    let (lower, upper) = match (values.min(), values.max()) {
        (Ok(&lo), Ok(&hi)) => (lo, hi),
        _ => return Histogram { lower: 0.0, upper: 0.0, counts },
    };
    if bins == 0 {
        return Histogram { lower, upper, counts };
    }
    let width = (upper - lower) / bins as f32;
    for &v in values.iter() {
        let bin = if width > 0.0 {
            (((v - lower) / width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[bin] += 1;
    }
    Histogram { lower, upper, counts }
}
