// Finsight Infrastructure - System Adapters
// Implements: UnitRunner, ResultExchange, EnvStore

pub mod file_result_exchange;
pub mod process_env;
pub mod subprocess_runner;

pub use file_result_exchange::{FileResultExchange, ResultLayout};
pub use process_env::ProcessEnv;
pub use subprocess_runner::SubprocessUnitRunner;
