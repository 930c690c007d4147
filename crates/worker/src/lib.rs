pub mod action_chain;
pub mod http_action;
pub mod retry;

pub use action_chain::ActionChainExecutor;
pub use http_action::{HttpActionExecutor, HttpAttempt, PreparedRequest};
pub use retry::EffectiveRetry;
