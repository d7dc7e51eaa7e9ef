pub mod invoker;

pub use invoker::{InvokeError, ModelBackend, SubprocessBackend};
