pub mod backend;

pub use backend::{BackendClient, VideoUpload};
