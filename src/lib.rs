mod app_data;
mod config;
mod dashboard;
mod editor;
mod event_multiplexer;
mod log_view;
mod model;
mod render;
mod runner;
mod store;

pub use paste;

pub use app_data::*;
pub use config::*;
pub use dashboard::*;
pub use editor::*;
pub use log_view::*;
pub use model::*;
pub use render::*;
pub use runner::*;
pub use store::*;
