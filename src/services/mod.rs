// src/services/mod.rs

pub mod audit;
pub mod distribution;
pub mod leads;
pub mod ledger;
pub mod parser;
pub mod sales;
pub mod session;
pub mod users;
