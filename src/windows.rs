use ndarray::{s, Array2, Array3};

use crate::embedding::{EmbeddingTable, VectorizeReport};
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    ZeroMaxlen,
}

impl std::fmt::Display for WindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowError::ZeroMaxlen => write!(f, "Window length (maxlen) must be greater than 0"),
        }
    }
}

impl std::error::Error for WindowError {}

/// Parallel training examples: `inputs[i]` is a `maxlen x D` block and
/// `targets[i]` the vector that follows it in the source stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindows {
    pub inputs: Array3<f32>,
    pub targets: Array2<f32>,
}

impl SequenceWindows {
    pub fn len(&self) -> usize {
        self.targets.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Slides a `maxlen` window with stride 1 over `vectors`.
///
/// Exactly `N - maxlen` windows are produced (none when `N <= maxlen`).
pub fn windows_from_vectors(vectors: &Array2<f32>, maxlen: usize) -> Result<SequenceWindows, WindowError> {
    if maxlen == 0 {
        return Err(WindowError::ZeroMaxlen);
    }
    let (n, dim) = vectors.dim();
    let count = n.saturating_sub(maxlen);

    let mut inputs = Array3::<f32>::zeros((count, maxlen, dim));
    let mut targets = Array2::<f32>::zeros((count, dim));
    for i in 0..count {
        inputs
            .slice_mut(s![i, .., ..])
            .assign(&vectors.slice(s![i..i + maxlen, ..]));
        targets.row_mut(i).assign(&vectors.row(i + maxlen));
    }
    Ok(SequenceWindows { inputs, targets })
}

/// Tokenizes, vectorizes (dropping misses) and windows a text.
pub fn make_windows(
    tokenizer: &Tokenizer,
    table: &EmbeddingTable,
    text: &str,
    maxlen: usize,
) -> Result<(SequenceWindows, VectorizeReport), WindowError> {
    let tokens = tokenizer.tokenize(text);
    let (vectors, report) = table.vectorize(&tokens);
    log::info!("Found {} unknown tokens", report.misses);
    log::info!("Miss rate: {:.6}", report.miss_rate());
    log::info!("Found {} valid words", report.found());

    let windows = windows_from_vectors(&vectors, maxlen)?;
    log::info!("Built {} windows of length {}", windows.len(), maxlen);
    Ok((windows, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use proptest::prelude::*;

    fn stream(n: usize, dim: usize) -> Array2<f32> {
        Array::from_shape_fn((n, dim), |(i, j)| (i * 10 + j) as f32)
    }

    #[test]
    fn test_windows_count_and_contents() -> Result<(), WindowError> {
        let vectors = stream(6, 2);
        let windows = windows_from_vectors(&vectors, 3)?;

        assert_eq!(windows.len(), 3);
        assert_eq!(windows.inputs.dim(), (3, 3, 2));
        assert_eq!(windows.inputs.slice(s![1, .., ..]), vectors.slice(s![1..4, ..]));
        assert_eq!(windows.targets.row(1), vectors.row(4));
        assert_eq!(windows.targets.row(2), vectors.row(5));
        Ok(())
    }

    #[test]
    fn test_short_stream_yields_no_windows() -> Result<(), WindowError> {
        let windows = windows_from_vectors(&stream(3, 2), 3)?;
        assert!(windows.is_empty());
        assert_eq!(windows.inputs.dim(), (0, 3, 2));

        let windows = windows_from_vectors(&stream(0, 2), 5)?;
        assert!(windows.is_empty());
        Ok(())
    }

    #[test]
    fn test_zero_maxlen_rejected() {
        assert_eq!(windows_from_vectors(&stream(4, 2), 0), Err(WindowError::ZeroMaxlen));
    }

    #[test]
    fn test_make_windows_skips_unknown_tokens() -> Result<(), Box<dyn std::error::Error>> {
        let table = EmbeddingTable::from_vectors(
            vec![
                ("one", vec![1.0, 0.0]),
                ("two", vec![2.0, 0.0]),
                ("three", vec![3.0, 0.0]),
                ("four", vec![4.0, 0.0]),
            ],
            2,
        )?;
        let tokenizer = Tokenizer::with_normalizer(Box::new(crate::normalize::IdentityNormalizer))?;

        let (windows, report) = make_windows(&tokenizer, &table, "one two mystery three four", 2)?;
        assert_eq!(report.misses, 1);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows.targets.row(0).to_vec(), vec![3.0, 0.0]);
        assert_eq!(windows.targets.row(1).to_vec(), vec![4.0, 0.0]);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_each_target_follows_its_window(n in 0usize..30, maxlen in 1usize..8) {
            let vectors = stream(n, 3);
            let windows = windows_from_vectors(&vectors, maxlen).expect("maxlen > 0");
            prop_assert_eq!(windows.len(), n.saturating_sub(maxlen));
            for i in 0..windows.len() {
                let block = windows.inputs.slice(s![i, .., ..]);
                prop_assert_eq!(block.nrows(), maxlen);
                prop_assert_eq!(block, vectors.slice(s![i..i + maxlen, ..]));
                prop_assert_eq!(windows.targets.row(i), vectors.row(i + maxlen));
            }
        }
    }
}
