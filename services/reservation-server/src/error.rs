use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// `Reserve`/`Cancel` against a flight that was never added.
    #[error("no such flight: {0}")]
    NoSuchFlight(String),

    /// `Reserve` against a flight with no seats left.
    #[error("flight is fully booked: {0}")]
    FullyBooked(String),

    /// `Cancel` by a user holding no reservation on that flight.
    #[error("no reservation held on flight: {0}")]
    NoSuchReservation(String),

    /// The underlying replicated log rejected the proposal (admin lock held).
    #[error("replicated log unavailable: {0}")]
    Paxos(#[from] paxos::PaxosError),
}
