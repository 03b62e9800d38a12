pub mod invocation;

pub(crate) mod worker;

pub use invocation::{
    Invocation, InvocationContext, InvocationFn, InvocationListener, Rescheduler,
};
