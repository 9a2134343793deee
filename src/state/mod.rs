// Entity states: local storage and the mirror of a remote hub

mod entity;
mod machine;
mod mirror;

pub use entity::{Attributes, EntityState};
pub use machine::{LocalStateMachine, StateMachine};
pub use mirror::StateMirror;
