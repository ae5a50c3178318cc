pub mod authenticator;
pub mod codec;
pub mod rate_limit;
pub mod token_store;
pub mod user_store;
pub mod watcher;

pub use authenticator::*;
pub use rate_limit::*;
pub use token_store::*;
pub use user_store::*;
