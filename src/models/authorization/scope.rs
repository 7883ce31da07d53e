//! Scope enum for authorization

// Owned - only objects of the caller, All - any object.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Scope {
    All,
    Owned,
}
