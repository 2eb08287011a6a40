pub mod classes;
pub mod core;
pub mod grades;
pub mod policy;
pub mod publish;
pub mod results;
pub mod statistics;
pub mod students;
