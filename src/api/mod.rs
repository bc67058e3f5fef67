mod extract;
pub mod public;
pub mod routes;
mod server;
mod state;

pub use extract::AuthUser;
pub use server::{app, serve};
pub use state::{AppState, SharedState};
