pub mod dispatcher;
pub mod error;
pub mod events;
pub mod renderer;
pub mod size;
pub mod uploader;
