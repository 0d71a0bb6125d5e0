mod backend;
mod boundaries;
mod chunking;
mod grounding;
mod inference;
mod merge;
mod parse;
mod pipeline;
mod prompt;
mod run;
mod tables;

pub use run::run;
