#![doc = "branchdocs: per-branch documentation builds, published atomically."]

//! A push notification becomes a [`BuildRequest`]; the single [`BuildQueue`]
//! worker syncs the source mirror, renders the branch in a throwaway working
//! copy, moves the output into permanent storage, repoints the branch's
//! symlink, and finally deletes every build output no branch points at.

pub mod builder;
pub mod cli;
pub mod collect;
pub mod config;
pub mod contract;
pub mod error;
pub mod exec;
pub mod hook;
pub mod layout;
pub mod load_config;
pub mod lock;
pub mod mirror;
pub mod pipeline;
pub mod publish;
pub mod queue;

pub use cli::{run, Cli, Commands};
pub use config::Config;
pub use contract::{BuildRequest, CommandOutput, CommandRunner, CommandSpec};
pub use layout::Layout;
pub use pipeline::{Pipeline, RequestReport};
pub use publish::PublishOutcome;
pub use queue::BuildQueue;
