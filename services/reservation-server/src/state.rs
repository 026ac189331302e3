//! Local flight-reservation state, mutated only by applying decided log
//! entries in slot order. The `capacity`/`reserved_by` map split and the
//! apply-in-slot-order dispatch loop are grounded on `server_impl.go`'s
//! `flightStatus`/`reservedFlights` maps and its `checkTicketsHelper`
//! dispatch target. `reserve`/`cancel` themselves are not mirrors of
//! `reserveTicketHelper`/`cancelFlightHelper` — those helpers decrement
//! capacity on every call with no per-user check and delete an entire
//! flight as an admin action respectively, neither of which is "a user
//! reserves/cancels their own seat". `reserve` here is idempotent per
//! `(flight, user)` pair and `cancel` removes only the caller's own
//! reservation; see the Open Questions resolution for this deviation.

use std::collections::{HashMap, HashSet};

use crate::command::{Command, CommandResult};
use crate::error::ReservationError;

/// Every replica seeds the same flight catalogue at construction time —
/// there is no `AddFlight` log entry, since the resource model is fixed
/// capacity per named flight, not a mutable catalogue.
#[derive(Debug, Clone)]
pub struct State {
    capacity: HashMap<String, u32>,
    reserved_by: HashMap<String, HashSet<String>>,
}

impl State {
    pub fn new(flights: impl IntoIterator<Item = (String, u32)>) -> Self {
        let capacity: HashMap<String, u32> = flights.into_iter().collect();
        let reserved_by = capacity.keys().map(|flight| (flight.clone(), HashSet::new())).collect();
        State { capacity, reserved_by }
    }

    /// Applies one decided log entry, mutating state and returning this
    /// entry's own result. Every replica calls this for every decided slot
    /// in order, so all replicas converge on the same state regardless of
    /// whose command it actually was.
    pub fn apply(&mut self, command: &Command) -> Result<CommandResult, ReservationError> {
        match command {
            Command::NoOp => Ok(CommandResult::Nothing),
            Command::Reserve { flight, user } => self.reserve(flight, user),
            Command::Cancel { flight, user } => self.cancel(flight, user),
            Command::Query { flight } => self.query(flight),
        }
    }

    fn reserve(&mut self, flight: &str, user: &str) -> Result<CommandResult, ReservationError> {
        let capacity = *self.capacity.get(flight).ok_or_else(|| ReservationError::NoSuchFlight(flight.to_owned()))?;
        let reserved = self.reserved_by.get_mut(flight).expect("capacity and reserved_by are seeded together");
        if reserved.contains(user) {
            return Ok(CommandResult::Reserved);
        }
        if reserved.len() as u32 >= capacity {
            return Err(ReservationError::FullyBooked(flight.to_owned()));
        }
        reserved.insert(user.to_owned());
        Ok(CommandResult::Reserved)
    }

    fn cancel(&mut self, flight: &str, user: &str) -> Result<CommandResult, ReservationError> {
        let reserved = self.reserved_by.get_mut(flight).ok_or_else(|| ReservationError::NoSuchFlight(flight.to_owned()))?;
        if !reserved.remove(user) {
            return Err(ReservationError::NoSuchReservation(flight.to_owned()));
        }
        Ok(CommandResult::Cancelled)
    }

    fn query(&self, flight: &str) -> Result<CommandResult, ReservationError> {
        let capacity = *self.capacity.get(flight).ok_or_else(|| ReservationError::NoSuchFlight(flight.to_owned()))?;
        let reserved = self.reserved_by.get(flight).expect("capacity and reserved_by are seeded together");
        Ok(CommandResult::SeatsAvailable(capacity - reserved.len() as u32))
    }
}
