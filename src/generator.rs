use std::io::{self, Write};

use crate::embedding::{value_histogram, EmbeddingTable};
use crate::model::{ModelError, SequenceModel};
use crate::resolver::{NearestWordResolver, ResolverError};
use crate::tokenizer::Tokenizer;

#[derive(Debug)]
pub enum GeneratorError {
    ModelError(ModelError),
    ResolverError(ResolverError),
    IoError(io::Error),
    SeedTooShort { needed: usize, found: usize },
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorError::ModelError(e) => write!(f, "Model error: {}", e),
            GeneratorError::ResolverError(e) => write!(f, "Resolver error: {}", e),
            GeneratorError::IoError(e) => write!(f, "IO error: {}", e),
            GeneratorError::SeedTooShort { needed, found } => write!(
                f,
                "Seed sentence has {} known tokens, {} are needed",
                found, needed
            ),
        }
    }
}

impl std::error::Error for GeneratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GeneratorError::ModelError(e) => Some(e),
            GeneratorError::ResolverError(e) => Some(e),
            GeneratorError::IoError(e) => Some(e),
            GeneratorError::SeedTooShort { .. } => None,
        }
    }
}

impl From<ModelError> for GeneratorError {
    fn from(err: ModelError) -> GeneratorError {
        GeneratorError::ModelError(err)
    }
}

impl From<ResolverError> for GeneratorError {
    fn from(err: ResolverError) -> GeneratorError {
        GeneratorError::ResolverError(err)
    }
}

impl From<io::Error> for GeneratorError {
    fn from(err: io::Error) -> GeneratorError {
        GeneratorError::IoError(err)
    }
}

/// Generates `size` tokens after the seed.
///
/// The window starts as the first `maxlen` seed tokens found in the table.
/// Each step vectorizes the window, asks the model for the next vector,
/// maps it to the nearest word and slides the window by one. Returns seed
/// and generated tokens joined by spaces.
pub fn generate_text<M: SequenceModel + ?Sized>(
    model: &M,
    tokenizer: &Tokenizer,
    table: &EmbeddingTable,
    seed_sentence: &str,
    size: usize,
    maxlen: usize,
) -> Result<String, GeneratorError> {
    let mut window: Vec<String> = tokenizer
        .tokenize(seed_sentence)
        .into_iter()
        .filter(|t| table.contains(t))
        .take(maxlen)
        .collect();
    if window.len() < maxlen {
        return Err(GeneratorError::SeedTooShort {
            needed: maxlen,
            found: window.len(),
        });
    }

    let resolver = NearestWordResolver::new(table);
    let mut generated = window.clone();
    let mut predicted_values: Vec<f32> = Vec::new();

    for step in 0..size {
        log::debug!("Window {}: {:?}", step, window);
        let (vectors, _) = table.vectorize(&window);
        let prediction = model.predict(vectors.view())?;
        predicted_values.extend(prediction.iter().copied());

        let next = resolver.resolve_verbose(prediction.view())?.word.to_string();
        log::debug!("Next token: {}", next);

        generated.push(next.clone());
        window.remove(0);
        window.push(next);
    }

    log::debug!(
        "Predicted value distribution: {:?}",
        value_histogram(predicted_values.iter(), 20)
    );
    let result = generated.join(" ");
    log::info!("Generated: {}", result);
    Ok(result)
}

/// Header line that opens each temperature section of a sample file.
pub fn temperature_header(temperature: f32) -> String {
    format!("\n----- temperature:{:?}\n", temperature)
}

/// Writes one section per temperature: header line, then generated text.
pub fn write_samples<W: Write>(writer: &mut W, samples: &[(f32, String)]) -> io::Result<()> {
    for (temperature, text) in samples {
        writer.write_all(temperature_header(*temperature).as_bytes())?;
        writer.write_all(text.as_bytes())?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::IdentityNormalizer;
    use ndarray::{Array1, ArrayView2, ArrayView3};

    /// Predicts the vector of the last token in the window.
    struct EchoLast;

    impl SequenceModel for EchoLast {
        fn predict(&self, window: ArrayView2<f32>) -> Result<Array1<f32>, ModelError> {
            Ok(window.row(window.nrows() - 1).to_owned())
        }

        fn train_batch(&mut self, _: ArrayView3<f32>, _: ArrayView2<f32>) -> Result<f32, ModelError> {
            Ok(0.0)
        }

        fn evaluate(&self, _: ArrayView3<f32>, _: ArrayView2<f32>) -> Result<f32, ModelError> {
            Ok(0.0)
        }

        fn save(&self, _: &std::path::Path) -> Result<(), crate::checkpoint::CheckpointError> {
            Ok(())
        }
    }

    fn fixture() -> (EmbeddingTable, Tokenizer) {
        let table = EmbeddingTable::from_vectors(
            vec![
                ("the", vec![0.0, 1.0]),
                ("cat", vec![1.0, 0.0]),
                ("sat", vec![1.0, 1.0]),
            ],
            2,
        )
        .expect("valid table");
        let tokenizer = Tokenizer::with_normalizer(Box::new(IdentityNormalizer)).expect("patterns compile");
        (table, tokenizer)
    }

    #[test]
    fn test_generate_appends_resolved_words() -> Result<(), GeneratorError> {
        let (table, tokenizer) = fixture();
        let text = generate_text(&EchoLast, &tokenizer, &table, "The unknown cat sat", 3, 2)?;
        assert_eq!(text, "the cat cat cat cat");
        Ok(())
    }

    #[test]
    fn test_generate_requires_enough_known_seed_tokens() {
        let (table, tokenizer) = fixture();
        let result = generate_text(&EchoLast, &tokenizer, &table, "the dog", 3, 2);
        assert!(matches!(
            result,
            Err(GeneratorError::SeedTooShort { needed: 2, found: 1 })
        ));
    }

    #[test]
    fn test_write_samples_format() -> io::Result<()> {
        let mut out = Vec::new();
        write_samples(&mut out, &[(1.0, "a b".to_string()), (0.5, "c".to_string())])?;
        assert_eq!(
            String::from_utf8_lossy(&out),
            "\n----- temperature:1.0\na b\n----- temperature:0.5\nc"
        );
        Ok(())
    }
}
