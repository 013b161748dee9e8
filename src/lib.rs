pub mod acquire;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod feature;
pub mod frame;
pub mod parameter;
pub mod pipeline;
pub mod process;
pub mod session;
pub mod tracker;

pub use config::Opts;
pub use feature::{FeatureStore, Field, FieldSet, Record};
pub use frame::Frame;
pub use parameter::{Parameter, Parameters};
pub use pipeline::{Pipeline, RunSummary};
pub use process::{ChainConfig, ProcessChain, ProcessStep};
pub use session::Session;
pub use tracker::ObjectTracker;
