//! Webhook and cron triggers.
//!
//! Every webhook trigger declared by the loaded tasks is compiled once into
//! [`matcher::TriggerMatcher`]; deliveries are matched against it and the
//! resulting runs go through the scheduling service like any other.

pub mod domain;
pub mod matcher;
pub mod services;

#[cfg(test)]
mod tests;
