//! Crate-wide typed errors. Replaces both the teacher's hand-rolled
//! `OrderError` `Display` impl and the Go source's
//! `strings.Contains(err.Error(), "no rows in result set")` sniffing
//! with a typed `StoreError::NotFound` (spec.md §9 REDESIGN FLAGS).

use thiserror::Error;

/// Errors surfaced by the persistence-store traits
/// (`SwapActionStore`, `SwapChainStore`, `SwapPairStore`, `OrderStore`).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("store error: {0}")]
    Other(String),
}

/// Errors surfaced by the exchange order API.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange request failed: {0}")]
    Request(String),
    #[error("exchange rejected order: {0}")]
    Rejected(String),
}

/// Errors classified by the swap executor (spec.md §7).
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("transient exchange error: {0}")]
    Transient(String),
    #[error("leg 1 post failed: {0}")]
    Leg1PostFailed(String),
    #[error("swap chain {0} not found")]
    ChainMissing(i64),
    #[error("no active swap action")]
    ActionNotFound,
    #[error("rollback infeasible: {0}")]
    RollbackInfeasible(String),
    #[error("force swap infeasible: {0}")]
    ForceSwapInfeasible(String),
    #[error("persistence failed on terminal write: {0}")]
    PersistenceFailed(String),
}
