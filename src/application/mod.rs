pub mod import;
pub mod jobs;
pub mod monitoring;
pub mod orchestrator;
pub mod reader;
pub mod replay;
pub mod splitter;
pub mod statement;
pub mod tagger;

#[cfg(test)]
pub(crate) mod testing;
