pub mod health;
pub mod runs;
pub mod steps;
pub mod workflows;
