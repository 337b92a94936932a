pub mod app;
pub mod cli;

pub use app::CastmateApp;
pub use cli::Cli;
