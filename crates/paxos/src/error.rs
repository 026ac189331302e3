use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaxosError {
    /// The admin lock is held (a membership change is in progress); new
    /// `Start` calls are rejected until it is released.
    #[error("paxos admin lock is held; no new Start calls are accepted")]
    AdminLocked,
}
