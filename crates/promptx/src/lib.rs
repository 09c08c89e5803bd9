pub mod errors;
pub mod functions;
pub mod models;
pub mod plugins;
pub mod prompt;
pub mod templates;
