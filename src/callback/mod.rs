pub mod dispatcher;
pub mod guard;
pub mod pool;

pub use dispatcher::{CallbackDispatcher, DispatchOutcome, DeliveryError};
pub use pool::CallbackPool;
