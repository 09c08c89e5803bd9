//! These models represent the objects passed between a prompt and its plugins
//!
//! Plugins convert them to and from their provider wire formats; the prompt
//! only ever sees these internal structs.
pub mod content;
pub mod function;
pub mod message;
