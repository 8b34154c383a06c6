mod catalog;
mod embedder;
mod run;
mod types;

#[cfg(test)]
mod tests;

pub(crate) use catalog::{DEFAULT_MAX_CANDIDATES, load_catalog};
pub(crate) use run::run;
