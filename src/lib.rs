pub mod boundary;
pub mod config;
pub mod domain;
pub mod error;
pub mod json_io;
pub mod linear_solver;
pub mod numerical;
pub mod solver;
