pub mod subscribe;

pub use subscribe::{ListenerRegistration, Unsubscribe};
