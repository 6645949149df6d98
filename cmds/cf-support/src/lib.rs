pub mod codefresh;
pub mod collect;
pub mod commands;
pub mod config;
pub mod k8s;
pub mod prompt;
pub mod runtime;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod yaml;
