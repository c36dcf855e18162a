pub mod crm;
pub mod documents;
pub mod system;
pub mod transcribe;
pub mod vision;

pub use system::System;
