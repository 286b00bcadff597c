pub mod address;
pub mod api;
pub mod config;
mod duplicator;
pub mod integrate;
pub mod issue;
pub mod markers;
pub mod merge;
pub mod migrate;
pub mod rewrite;
pub mod runtime;

#[cfg(test)]
mod testing;
