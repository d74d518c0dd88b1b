//! Names, control codes and wire layouts shared between the agent and the
//! physical-memory helper driver.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod constants;
pub mod winio;
