pub mod codec;
pub mod command;
pub mod command_handlers;
pub mod command_router;
pub mod dispatcher;
pub mod notifier;
pub mod sink;
pub mod worker_pool;

pub use command::{Command, CommandResult, Payload};
pub use command_handlers::{HandlerEntry, HandlerError, HandlerProvider};
pub use command_router::{CommandHandler, HandlerKey, HandlerRegistry};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use notifier::Notifier;
pub use sink::{ChannelResultSink, ResultSink, StdoutResultSink};
pub use worker_pool::WorkerPoolStatsSnapshot;
