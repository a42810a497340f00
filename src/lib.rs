// aas-query - data analyst agent for Azure Analysis Services
// Library exports

pub mod agent;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod errors;
pub mod providers;
pub mod tools;
