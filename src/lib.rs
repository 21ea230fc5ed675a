// Word-level tweet generation over pretrained GloVe Twitter vectors.
// The pipeline: tokenize -> vectorize -> window -> model -> nearest word.

pub mod checkpoint;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod generator;
pub mod model;
pub mod normalize;
pub mod resolver;
pub mod tokenizer;
pub mod training;
pub mod windows;
