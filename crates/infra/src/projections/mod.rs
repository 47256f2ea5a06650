//! Postgres projection storage (the batched upsert/prune statements).

pub mod postgres;
