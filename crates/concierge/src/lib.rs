pub mod agent;
pub mod errors;
pub mod guardian;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod session;
pub mod speech;
pub mod systems;
