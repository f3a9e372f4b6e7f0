//! Shared-expense ledger for group trips.
//!
//! Members record expenses, the ledger nets them into per-member balances,
//! and a greedy optimizer proposes the fewest payments that settle the trip.
//! Payments between members go through a pending → confirmed/rejected
//! lifecycle, and trip membership follows an RSVP × down-payment state machine.

pub mod balance;
pub mod config;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod lifecycle;
pub mod logger;
pub mod membership;
pub mod money;
pub mod routes;
pub mod schemas;
pub mod settlement;
pub mod store;
pub mod validation;
